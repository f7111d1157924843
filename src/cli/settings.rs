use super::ui;
use crate::core::settings::{CurrencySettings, SettingsUpdate};
use crate::service::CurrencyConversionService;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

pub fn show(settings: &CurrencySettings) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Setting"), ui::header_cell("Value")]);
    table.add_row(vec![
        Cell::new("Currency conversion"),
        ui::flag_cell(settings.enable_currency_conversion),
    ]);
    table.add_row(vec![
        Cell::new("Auto-convert"),
        ui::flag_cell(settings.auto_convert_currencies),
    ]);
    table.add_row(vec![
        Cell::new("Display currency"),
        Cell::new(&settings.preferred_display_currency),
    ]);
    table.add_row(vec![
        Cell::new("Show original currency"),
        ui::flag_cell(settings.show_original_currency),
    ]);
    table.add_row(vec![
        Cell::new("Show conversion rates"),
        ui::flag_cell(settings.show_conversion_rates),
    ]);
    table.add_row(vec![
        Cell::new("Refresh interval"),
        Cell::new(format!("{} min", settings.currency_refresh_interval))
            .set_alignment(CellAlignment::Right),
    ]);
    println!("{table}");
}

pub async fn set(service: &CurrencyConversionService, update: SettingsUpdate) -> Result<()> {
    if update.is_empty() {
        anyhow::bail!("No settings to change");
    }
    match service.update_settings(update).await {
        Ok(settings) => {
            println!("{}", ui::style_text("Settings saved", ui::StyleType::Title));
            show(&settings);
            Ok(())
        }
        Err(e) => {
            show(&service.settings());
            Err(anyhow::anyhow!("Failed to save settings: {}", e.user_message()))
        }
    }
}
