//! `quorum specialist` — Inspect the specialist roster.

use quorum_core::state::AppState;

pub fn list(state: &AppState) -> Result<(), String> {
    let specialists = state.specialists.all();
    if specialists.is_empty() {
        println!("No specialists loaded.");
        return Ok(());
    }

    println!("┌──────────────────────┬────────────────────────┬──────────────────────────────┐");
    println!("│ ID                   │ Name                   │ Competencies                 │");
    println!("├──────────────────────┼────────────────────────┼──────────────────────────────┤");
    for spec in specialists {
        println!(
            "│ {:<20} │ {:<22} │ {:<28} │",
            truncate(&spec.id, 20),
            truncate(&spec.name, 22),
            truncate(&spec.competencies.join(", "), 28),
        );
    }
    println!("└──────────────────────┴────────────────────────┴──────────────────────────────┘");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
