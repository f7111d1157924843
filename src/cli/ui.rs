use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Amount,
    Error,
    Warning,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Amount => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Warning => style(text).yellow(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// `12.5, "EUR"` becomes `12.50 EUR`.
pub fn format_money(amount: f64, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.4}")
}

/// Formats an `Option<T>` into a right-aligned `Cell`. `None` is displayed
/// as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(na_cell(false).set_alignment(CellAlignment::Right), |v| {
        Cell::new(format_fn(v)).set_alignment(CellAlignment::Right)
    })
}

/// Creates a cell for "N/A" values, with error-specific styling.
pub fn na_cell(has_error: bool) -> Cell {
    let color = if has_error {
        Color::Red
    } else {
        Color::DarkGrey
    };
    Cell::new("N/A").fg(color)
}

pub fn stale_cell(is_stale: bool) -> Cell {
    if is_stale {
        Cell::new("stale").fg(Color::Yellow)
    } else {
        Cell::new("fresh").fg(Color::Green)
    }
}

pub fn flag_cell(enabled: bool) -> Cell {
    if enabled {
        Cell::new("on").fg(Color::Green)
    } else {
        Cell::new("off").fg(Color::DarkGrey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_and_rate_formatting() {
        assert_eq!(format_money(108.0, "USD"), "108.00 USD");
        assert_eq!(format_money(0.5, "EUR"), "0.50 EUR");
        assert_eq!(format_rate(1.08), "1.0800");
    }

    #[test]
    fn test_optional_cell_content() {
        assert_eq!(format_optional_cell(Some(1.5), format_rate).content(), "1.5000");
        assert_eq!(format_optional_cell(None::<f64>, format_rate).content(), "N/A");
    }
}
