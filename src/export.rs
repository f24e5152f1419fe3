// 📊 Report Export - summary + roster workbook, built in memory
//
// Sheet 1 is the reference-ordered summary, sheet 2 the full deduplicated
// roster. The unmatched-unit audit goes on an optional third sheet.

use crate::batch::{RegistrationRecord, PERSON_COLUMN, UNIT_COLUMN};
use crate::data_quality::UnmatchedUnit;
use crate::error::Result;
use crate::reconciliation::SummaryRow;
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Color, Format, Workbook};
use std::path::{Path, PathBuf};

pub const SUMMARY_SHEET: &str = "人數統計";
pub const ROSTER_SHEET: &str = "詳細名單";
pub const UNMATCHED_SHEET: &str = "未對應單位";
pub const COUNT_HEADER: &str = "報名人數";

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A finished workbook, not yet written anywhere
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ReportArtifact {
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "report written");
        Ok(path)
    }
}

/// "RFA報名統計表_20260105_1430.xlsx"
pub fn report_file_name(at: DateTime<Local>) -> String {
    format!("RFA報名統計表_{}.xlsx", at.format("%Y%m%d_%H%M"))
}

pub fn build_report(
    summary: &[SummaryRow],
    roster: &[RegistrationRecord],
    unmatched: Option<&[UnmatchedUnit]>,
) -> Result<ReportArtifact> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let heading_row = Format::new().set_bold().set_background_color(Color::RGB(0xD9D9D9));

    {
        let sheet = workbook.add_worksheet().set_name(SUMMARY_SHEET)?;
        sheet.write_string_with_format(0, 0, UNIT_COLUMN, &header)?;
        sheet.write_string_with_format(0, 1, COUNT_HEADER, &header)?;

        for (i, row) in summary.iter().enumerate() {
            let r = (i + 1) as u32;
            match row.count {
                Some(count) => {
                    sheet.write_string(r, 0, &row.display_text)?;
                    sheet.write_number(r, 1, count as f64)?;
                }
                // Headings get no count cell at all
                None => {
                    sheet.write_string_with_format(r, 0, &row.display_text, &heading_row)?;
                }
            }
        }
        sheet.set_column_width(0, 28)?;
        sheet.set_column_width(1, 10)?;
    }

    {
        let sheet = workbook.add_worksheet().set_name(ROSTER_SHEET)?;
        sheet.write_string_with_format(0, 0, UNIT_COLUMN, &header)?;
        sheet.write_string_with_format(0, 1, PERSON_COLUMN, &header)?;

        for (i, record) in roster.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &record.unit)?;
            sheet.write_string(r, 1, &record.name)?;
        }
        sheet.set_column_width(0, 28)?;
        sheet.set_column_width(1, 14)?;
    }

    if let Some(unmatched) = unmatched {
        let sheet = workbook.add_worksheet().set_name(UNMATCHED_SHEET)?;
        sheet.write_string_with_format(0, 0, UNIT_COLUMN, &header)?;
        sheet.write_string_with_format(0, 1, COUNT_HEADER, &header)?;

        for (i, unit) in unmatched.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &unit.unit)?;
            sheet.write_number(r, 1, unit.count as f64)?;
        }
        sheet.set_column_width(0, 28)?;
    }

    let bytes = workbook.save_to_buffer()?;

    Ok(ReportArtifact {
        file_name: report_file_name(Local::now()),
        bytes,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn summary() -> Vec<SummaryRow> {
        vec![
            SummaryRow { display_text: "TP838富宅".to_string(), count: Some(1) },
            SummaryRow { display_text: "資深處".to_string(), count: None },
            SummaryRow { display_text: "AB123信義".to_string(), count: Some(0) },
        ]
    }

    #[test]
    fn test_report_file_name() {
        let at = Local.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        assert_eq!(report_file_name(at), "RFA報名統計表_20260105_1430.xlsx");
    }

    #[test]
    fn test_report_sheets_and_cells() {
        let roster = vec![RegistrationRecord::new("TP838富宅", "王小明")];
        let artifact = build_report(&summary(), &roster, None).unwrap();

        let dir = TempDir::new().unwrap();
        let path = artifact.write_to_dir(dir.path()).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec![SUMMARY_SHEET.to_string(), ROSTER_SHEET.to_string()]);

        let range = workbook.worksheet_range(SUMMARY_SHEET).unwrap();
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("TP838富宅".to_string())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::Float(1.0)));
        // Heading row has no count
        assert!(matches!(range.get_value((2, 1)), None | Some(Data::Empty)));
        assert_eq!(range.get_value((3, 1)), Some(&Data::Float(0.0)));

        let roster_range = workbook.worksheet_range(ROSTER_SHEET).unwrap();
        assert_eq!(roster_range.get_value((1, 1)), Some(&Data::String("王小明".to_string())));
    }

    #[test]
    fn test_unmatched_sheet_optional() {
        let unmatched = vec![UnmatchedUnit { unit: "神秘".to_string(), count: 3 }];
        let artifact = build_report(&summary(), &[], Some(&unmatched)).unwrap();

        let dir = TempDir::new().unwrap();
        let path = artifact.write_to_dir(dir.path()).unwrap();

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names().len(), 3);
        assert_eq!(workbook.sheet_names()[2], UNMATCHED_SHEET);
    }
}
