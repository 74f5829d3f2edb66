//! Plain-text tables, detail views and CSV export.

use chrono::NaiveDate;

use crate::db::{start_end_of_week, Page};
use crate::directory::{Plant, User};
use crate::fields::{DueFilter, Frequency, FrequencyUnit, Module, Permission};
use crate::lifecycle::days_until_due;
use crate::settings::AppSettings;
use crate::task::{TaskInstance, TaskMaster};

/// Relative due date: "today", "tomorrow", "in 3d", "2d late".
pub fn format_due_relative(due: NaiveDate, today: NaiveDate) -> String {
    match days_until_due(due, today) {
        0 => "today".into(),
        1 => "tomorrow".into(),
        n if n > 1 => format!("in {n}d"),
        n => format!("{}d late", -n),
    }
}

pub fn format_frequency(m: &TaskMaster) -> String {
    match (m.frequency, m.frequency_value, m.frequency_unit) {
        (Frequency::Custom, Some(v), Some(unit)) => {
            let unit = match unit {
                FrequencyUnit::Days => "d",
                FrequencyUnit::Weeks => "w",
                FrequencyUnit::Months => "mo",
            };
            format!("every {v}{unit}")
        }
        (f, _, _) => f.as_str().to_string(),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Whether an instance passes a due-date filter.
pub fn matches_due(t: &TaskInstance, filter: DueFilter, today: NaiveDate, due_soon_days: i64) -> bool {
    match filter {
        DueFilter::Today => t.due_date == today,
        DueFilter::ThisWeek => {
            let (start, end) = start_end_of_week(today);
            t.due_date >= start && t.due_date <= end
        }
        DueFilter::Overdue => t.is_overdue(today),
        DueFilter::DueSoon => t.is_due_soon(today, due_soon_days),
    }
}

fn page_footer<T>(page: &Page<T>) {
    let p = &page.pagination;
    if p.total_pages > 1 {
        println!("-- page {}/{} ({} total) --", p.page, p.total_pages, p.total);
    }
}

pub fn print_master_table(page: &Page<TaskMaster>) {
    println!(
        "{:<5} {:<8} {:<12} {:<7} {:<6} {:<6} {}",
        "ID", "Type", "Frequency", "Pri", "Plant", "User", "Title"
    );
    for m in &page.data {
        let kind = if m.task_type == crate::fields::TaskType::OneTime {
            "one-time"
        } else if m.is_active {
            "active"
        } else {
            "paused"
        };
        println!(
            "{:<5} {:<8} {:<12} {:<7} {:<6} {:<6} {}",
            m.id,
            kind,
            truncate(&format_frequency(m), 12),
            m.priority.as_str(),
            m.plant_id,
            m.assigned_to,
            m.title
        );
    }
    page_footer(page);
}

/// Instances table. The flag column marks overdue (`!`) and due-soon (`~`).
pub fn print_instance_table(instances: &[&TaskInstance], today: NaiveDate, due_soon_days: i64) {
    println!(
        "{:<5} {:<1} {:<11} {:<7} {:<10} {:<10} {:<6} {}",
        "ID", "", "Status", "Pri", "Scheduled", "Due", "User", "Title"
    );
    for t in instances {
        let flag = if t.is_overdue(today) {
            "!"
        } else if t.is_due_soon(today, due_soon_days) {
            "~"
        } else {
            " "
        };
        println!(
            "{:<5} {:<1} {:<11} {:<7} {:<10} {:<10} {:<6} {}",
            t.id,
            flag,
            t.status.as_str(),
            t.priority.as_str(),
            t.scheduled_date,
            format_due_relative(t.due_date, today),
            t.assigned_to,
            t.title
        );
    }
}

pub fn print_instance_page(page: &Page<TaskInstance>, today: NaiveDate, due_soon_days: i64) {
    let rows: Vec<&TaskInstance> = page.data.iter().collect();
    print_instance_table(&rows, today, due_soon_days);
    page_footer(page);
}

pub fn print_plant_table(plants: &[Plant]) {
    println!("{:<5} {:<8} {:<8} {:<24} {}", "ID", "Code", "Active", "Name", "Location");
    for p in plants {
        println!(
            "{:<5} {:<8} {:<8} {:<24} {}",
            p.id,
            p.code,
            if p.is_active { "yes" } else { "no" },
            truncate(&p.name, 24),
            p.location.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_user_table(page: &Page<User>) {
    println!("{:<5} {:<9} {:<7} {:<28} {:<16} {}", "ID", "Role", "Active", "Email", "Plant", "Name");
    for u in &page.data {
        println!(
            "{:<5} {:<9} {:<7} {:<28} {:<16} {}",
            u.id,
            format!("{:?}", u.role).to_lowercase(),
            if u.is_active { "yes" } else { "no" },
            truncate(&u.email, 28),
            truncate(u.plant.as_deref().unwrap_or("-"), 16),
            u.display_name
        );
    }
    page_footer(page);
}

pub fn print_master_detail(m: &TaskMaster) {
    println!("ID:           {}", m.id);
    println!("Title:        {}", m.title);
    println!("Description:  {}", m.description);
    println!("Type:         {:?}", m.task_type);
    println!("Frequency:    {}", format_frequency(m));
    println!("Start:        {}", m.start_date);
    println!("Active:       {}", m.is_active);
    println!("Priority:     {}", m.priority.as_str());
    println!("Plant:        {}", m.plant_id);
    println!("Assigned to:  {} (by {})", m.assigned_to, m.assigned_by);
    println!("Estimate:     {} min", m.estimated_duration);
    println!("Due within:   {} day(s)", m.due_within_days);
    if let Some(last) = m.last_generated {
        println!("Generated to: {last}");
    }
    if let Some(text) = &m.instructions {
        println!("Instructions: {text}");
    }
}

pub fn print_instance_detail(t: &TaskInstance, today: NaiveDate, due_soon_days: i64) {
    println!("ID:           {}", t.id);
    println!("Master:       {}", t.task_master_id);
    println!("Title:        {}", t.title);
    println!("Description:  {}", t.description);
    println!("Status:       {}", t.status.as_str());
    println!("Priority:     {}", t.priority.as_str());
    println!("Scheduled:    {}", t.scheduled_date);
    println!("Due:          {} ({})", t.due_date, format_due_relative(t.due_date, today));
    if t.is_overdue(today) {
        println!("              OVERDUE");
    } else if t.is_due_soon(today, due_soon_days) {
        println!("              due soon");
    }
    println!("Assigned to:  {} (plant {})", t.assigned_to, t.plant_id);
    println!("Estimate:     {} min", t.estimated_duration);
    if let Some(actual) = t.actual_duration {
        println!("Actual:       {actual} min");
    }
    if let Some(at) = t.completed_at {
        println!("Completed:    {}", at.to_rfc3339());
    }
    if let Some(notes) = &t.notes {
        println!("Notes:        {notes}");
    }
    if let Some(text) = &t.instructions {
        println!("Instructions: {text}");
    }
}

pub fn print_user_detail(u: &User) {
    println!("ID:           {}", u.id);
    println!("Email:        {}", u.email);
    println!("Name:         {}", u.display_name);
    println!("Role:         {:?}", u.role);
    println!("Active:       {}", u.is_active);
    println!("Plant:        {}", u.plant.as_deref().unwrap_or("-"));
    for module in Module::ALL {
        let grants: Vec<&str> = Permission::ALL
            .into_iter()
            .filter(|p| u.can(module, *p))
            .map(Permission::as_str)
            .collect();
        println!("  {:<15} {}", module.as_str(), if grants.is_empty() { "-".into() } else { grants.join(",") });
    }
}

pub fn print_settings(s: &AppSettings) {
    println!("App name:     {}", s.app_name);
    println!("Company:      {}", s.company_name);
    println!("Logo:         {}", s.logo_url.as_deref().unwrap_or("-"));
    println!("Color:        {}", s.primary_color);
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Task instances as CSV, one row per instance.
pub fn instances_to_csv(instances: &[&TaskInstance]) -> String {
    let mut out = String::from(
        "ID,MasterID,Title,Status,Priority,PlantID,AssignedTo,Scheduled,Due,CompletedUTC,EstimatedMin,ActualMin,Notes\n",
    );
    for t in instances {
        let completed = t.completed_at.map(|c| c.to_rfc3339()).unwrap_or_default();
        let actual = t.actual_duration.map(|a| a.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            t.id,
            t.task_master_id,
            escape_csv(&t.title),
            t.status.as_str(),
            t.priority.as_str(),
            t.plant_id,
            t.assigned_to,
            t.scheduled_date,
            t.due_date,
            completed,
            t.estimated_duration,
            actual,
            escape_csv(t.notes.as_deref().unwrap_or(""))
        ));
    }
    out
}
