use super::ui;
use crate::core::currency::{ConvertedAmount, Priority};
use crate::service::{BatchItem, CurrencyConversionService};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment};
use std::collections::BTreeMap;

/// Parses `AMOUNT:CURRENCY`, e.g. `9.99:EUR`.
pub fn parse_batch_item(s: &str) -> Result<BatchItem> {
    let (amount, currency) = s
        .split_once(':')
        .with_context(|| format!("Expected AMOUNT:CURRENCY, got '{s}'"))?;
    let amount: f64 = amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount in '{s}'"))?;
    let currency = parse_currency_code(currency)?;
    Ok(BatchItem::new(amount, &currency))
}

/// Parses `FROM:TO`, e.g. `EUR:USD`.
pub fn parse_pair(s: &str) -> Result<(String, String)> {
    let (from, to) = s
        .split_once(':')
        .with_context(|| format!("Expected FROM:TO, got '{s}'"))?;
    Ok((parse_currency_code(from)?, parse_currency_code(to)?))
}

fn parse_currency_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        anyhow::bail!("Invalid currency code: '{code}'");
    }
    Ok(code.to_uppercase())
}

pub async fn convert(
    service: &CurrencyConversionService,
    amount: f64,
    from: &str,
    to: Option<&str>,
    priority: Priority,
) -> Result<()> {
    let from = from.to_uppercase();
    match service.convert_amount(amount, &from, to, priority).await {
        Some(converted) => println!("{}", describe_conversion(service, &converted)),
        None => {
            // Fall back to the amount as entered
            println!("{}", ui::format_money(amount, &from));
            if let Some(message) = service.error() {
                println!("{}", ui::style_text(&message, ui::StyleType::Error));
            } else if !service.is_conversion_enabled() {
                println!(
                    "{}",
                    ui::style_text("Currency conversion is disabled", ui::StyleType::Subtle)
                );
            }
        }
    }
    Ok(())
}

fn describe_conversion(service: &CurrencyConversionService, converted: &ConvertedAmount) -> String {
    let settings = service.settings();
    let mut line = ui::style_text(
        &ui::format_money(converted.converted_amount, &converted.converted_currency),
        ui::StyleType::Amount,
    );
    if settings.show_original_currency {
        line.push_str(&format!(
            " (from {})",
            ui::format_money(converted.original_amount, &converted.original_currency)
        ));
    }
    if settings.show_conversion_rates {
        line.push_str(&format!(
            " @ {}",
            ui::format_rate(converted.exchange_rate)
        ));
    }
    if converted.is_stale {
        line.push_str(&format!(
            " {}",
            ui::style_text("[stale rate]", ui::StyleType::Warning)
        ));
    }
    line
}

pub async fn batch(service: &CurrencyConversionService, items: &[BatchItem]) -> Result<()> {
    let results = service.batch_convert(items).await;
    let target = service.preferred_currency();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Original"),
        ui::header_cell(&format!("Converted ({target})")),
        ui::header_cell("Rate"),
        ui::header_cell("Rate Age"),
    ]);

    let mut remaining: Vec<&ConvertedAmount> = results.iter().collect();
    for item in items {
        let original = ui::format_money(item.amount, &item.from_currency.to_uppercase());
        let position = remaining.iter().position(|c| {
            c.original_amount == item.amount
                && c.original_currency.eq_ignore_ascii_case(&item.from_currency)
        });
        match position.map(|i| remaining.remove(i)) {
            Some(converted) => table.add_row(vec![
                Cell::new(original),
                Cell::new(ui::format_money(converted.converted_amount, &target))
                    .set_alignment(CellAlignment::Right),
                Cell::new(ui::format_rate(converted.exchange_rate))
                    .set_alignment(CellAlignment::Right),
                ui::stale_cell(converted.is_stale),
            ]),
            None if item.from_currency.eq_ignore_ascii_case(&target) => table.add_row(vec![
                Cell::new(&original),
                Cell::new(&original).set_alignment(CellAlignment::Right),
                ui::na_cell(false),
                ui::na_cell(false),
            ]),
            None => table.add_row(vec![
                Cell::new(original),
                ui::na_cell(true),
                ui::na_cell(true),
                ui::na_cell(true),
            ]),
        };
    }
    println!("{table}");

    if let Some(message) = service.error() {
        println!("{}", ui::style_text(&message, ui::StyleType::Error));
    }
    Ok(())
}

pub async fn rates(
    service: &CurrencyConversionService,
    base: Option<&str>,
    targets: &[String],
) -> Result<()> {
    let targets: Vec<String> = targets.iter().map(|t| t.to_uppercase()).collect();
    let rates = service
        .exchange_rates(base, &targets)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!(
        "\nExchange rates for {} as of {}",
        ui::style_text(&rates.base_currency, ui::StyleType::Title),
        rates.timestamp.format("%Y-%m-%d %H:%M UTC")
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Rate")]);
    let sorted: BTreeMap<&String, &f64> = rates.rates.iter().collect();
    for (code, rate) in sorted {
        table.add_row(vec![
            Cell::new(code),
            Cell::new(ui::format_rate(*rate)).set_alignment(CellAlignment::Right),
        ]);
    }
    for missing in targets.iter().filter(|t| !rates.rates.contains_key(*t)) {
        table.add_row(vec![Cell::new(missing), ui::na_cell(true)]);
    }
    println!("{table}");
    Ok(())
}

pub async fn currencies(service: &CurrencyConversionService) -> Result<()> {
    let currencies = service.supported_currencies().await;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Symbol"),
    ]);
    for currency in &currencies {
        table.add_row(vec![
            Cell::new(&currency.code),
            Cell::new(&currency.name),
            Cell::new(&currency.symbol),
        ]);
    }
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_item() {
        let item = parse_batch_item("9.99:eur").unwrap();
        assert_eq!(item, BatchItem::new(9.99, "EUR"));

        let item = parse_batch_item(" 100 : GBP ").unwrap();
        assert_eq!(item, BatchItem::new(100.0, "GBP"));
    }

    #[test]
    fn test_parse_batch_item_rejects_malformed_input() {
        assert!(parse_batch_item("9.99EUR").is_err());
        assert!(parse_batch_item("abc:EUR").is_err());
        assert!(parse_batch_item("10:EURO").is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("eur:usd").unwrap(),
            ("EUR".to_string(), "USD".to_string())
        );
        assert!(parse_pair("EUR-USD").is_err());
        assert!(parse_pair("EUR:U1D").is_err());
    }
}
