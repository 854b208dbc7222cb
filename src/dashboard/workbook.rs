//! `.xlsx` rendering of a dashboard snapshot.
//!
//! Layout:
//!
//! ```text
//! row 0   title
//! row 1   version + creation time
//! row 3   Indicator | Series | Freq | Units | Latest Date | Released | Present | Lag 1 .. Lag N
//! row 4+  section headers followed by their rows
//! ```

use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, XlsxError};

use super::snapshot::{DashboardEntry, DashboardSnapshot};

const SHEET_NAME: &str = "Dashboard";
const HEADER_ROW: u32 = 3;
const FIRST_VALUE_COL: u16 = 6;

/// Render the snapshot into an in-memory workbook.
pub fn render_workbook(snapshot: &DashboardSnapshot) -> Result<Vec<u8>, XlsxError> {
    let title_fmt = Format::new().set_bold().set_font_size(14);
    let header_fmt = Format::new().set_bold().set_border_bottom(FormatBorder::Thin);
    let section_fmt = Format::new().set_bold().set_italic();
    let number_fmt = Format::new().set_num_format("#,##0.00##");
    let error_fmt = Format::new().set_font_color(Color::Red);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    sheet.write_string_with_format(0, 0, &snapshot.title, &title_fmt)?;
    sheet.write_string(
        1,
        0,
        format!(
            "Version {} ({})",
            snapshot.version,
            snapshot.created_at.format("%Y-%m-%d %H:%M UTC")
        ),
    )?;

    let mut headers: Vec<String> = ["Indicator", "Series", "Freq", "Units", "Latest Date", "Released", "Present"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend((1..=snapshot.lags).map(|k| format!("Lag {k}")));
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(HEADER_ROW, col as u16, header, &header_fmt)?;
    }

    let mut row = HEADER_ROW + 1;
    let mut current_section: Option<&str> = None;
    for entry in &snapshot.entries {
        if current_section != Some(entry.section.as_str()) {
            sheet.write_string_with_format(row, 0, &entry.section, &section_fmt)?;
            current_section = Some(entry.section.as_str());
            row += 1;
        }
        write_entry(sheet, row, entry, &number_fmt, &error_fmt)?;
        row += 1;
    }

    sheet.set_column_width(0, 32)?;
    sheet.set_column_width(1, 18)?;
    sheet.set_column_width(3, 14)?;
    sheet.set_column_width(4, 40)?;
    sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;

    workbook.save_to_buffer()
}

fn write_entry(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    entry: &DashboardEntry,
    number_fmt: &Format,
    error_fmt: &Format,
) -> Result<(), XlsxError> {
    sheet.write_string(row, 0, &entry.label)?;
    sheet.write_string(row, 1, &entry.series_id)?;
    if let Some(frequency) = entry.frequency {
        sheet.write_string(row, 2, frequency.code())?;
    }
    sheet.write_string(row, 3, &entry.units)?;

    if let Some(err) = &entry.error {
        sheet.write_string_with_format(row, 4, format!("ERR: {err}"), error_fmt)?;
        return Ok(());
    }
    if let Some(date) = entry.latest_date {
        sheet.write_string(row, 4, date.format("%Y-%m-%d").to_string())?;
    }
    if let Some(date) = entry.released {
        sheet.write_string(row, 5, date.format("%Y-%m-%d").to_string())?;
    }

    let values = std::iter::once(entry.present).chain(entry.lags.iter().copied());
    for (offset, value) in values.enumerate() {
        if let Some(v) = value {
            sheet.write_number_with_format(row, FIRST_VALUE_COL + offset as u16, v, number_fmt)?;
        }
    }
    Ok(())
}
