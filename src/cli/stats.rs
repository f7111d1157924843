use super::ui;
use crate::service::CurrencyConversionService;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

/// Optionally warms the cache with `pairs`, then prints the cache counters.
pub async fn run(service: &CurrencyConversionService, pairs: &[(String, String)]) -> Result<()> {
    if !pairs.is_empty() {
        let loaded = service.preload_currency_pairs(pairs).await;
        println!(
            "{}",
            ui::style_text(
                &format!("Preloaded {loaded} of {} pairs", pairs.len()),
                ui::StyleType::Subtle
            )
        );
    }

    let stats = service.cache_stats().await;

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
    for (label, value) in [
        ("Cached conversions", stats.entries as u64),
        ("Cache hits", stats.total_hits),
        ("Pending requests", stats.pending_requests as u64),
        ("Scheduled timers", stats.scheduled_timers as u64),
        ("Tracked pairs", stats.tracked_pairs as u64),
        ("Frequent pairs", stats.frequent_pairs as u64),
    ] {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");

    if !stats.top_pairs.is_empty() {
        let mut top = ui::new_styled_table();
        top.set_header(vec![ui::header_cell("Pair"), ui::header_cell("Uses")]);
        for (pair, count) in &stats.top_pairs {
            top.add_row(vec![
                Cell::new(pair),
                Cell::new(count).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{top}");
    }
    Ok(())
}
