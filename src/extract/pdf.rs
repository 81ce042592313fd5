use lopdf::Document;

use super::{DocumentExtractor, ExtractionError, PageTables, Table};

/// Marker appended after each extracted page.
pub const PAGE_SEPARATOR: &str = "\n---\n";

/// Minimum consecutive tabular lines that make up a table.
const MIN_TABLE_ROWS: usize = 2;

/// PDF extractor backed by lopdf's text layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn page_texts(&self, document: &[u8], pages: &[u32]) -> Result<Vec<(u32, String)>, ExtractionError> {
        let _span = tracing::debug_span!("extract.pdf", pages.requested = pages.len()).entered();

        let doc = Document::load_mem(document).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        let available = doc.get_pages();

        let mut out = Vec::with_capacity(pages.len());
        for &page in pages {
            if !available.contains_key(&page) {
                continue;
            }
            let text = match doc.extract_text(&[page]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(page, error = %e, "page text layer unreadable");
                    String::new()
                }
            };
            out.push((page, text));
        }
        Ok(out)
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract_text(&self, document: &[u8], pages: &[u32]) -> Result<String, ExtractionError> {
        let mut full_text = String::new();
        for (_, text) in self.page_texts(document, pages)? {
            full_text.push_str(&text);
            full_text.push_str(PAGE_SEPARATOR);
        }
        Ok(full_text)
    }

    fn extract_tables(
        &self,
        document: &[u8],
        pages: &[u32],
    ) -> Result<PageTables, ExtractionError> {
        let mut tables = PageTables::new();
        for (page, text) in self.page_texts(document, pages)? {
            let found = detect_tables(&text);
            if !found.is_empty() {
                tracing::debug!(page, tables = found.len(), "tables detected");
                tables.insert(page, found);
            }
        }
        Ok(tables)
    }
}

/// Groups runs of tabular lines into tables. The first line of a run is the
/// header.
pub fn detect_tables(text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<String>>| {
        if run.len() >= MIN_TABLE_ROWS {
            let mut rows = std::mem::take(run);
            let columns = rows.remove(0);
            tables.push(Table::new(columns, rows));
        } else {
            run.clear();
        }
    };

    for line in text.lines() {
        if is_tabular_line(line) {
            run.push(split_cells(line));
        } else {
            flush(&mut run);
        }
    }
    flush(&mut run);

    tables
}

/// A line is tabular when it has several columns separated by tabs, pipes or
/// aligned runs of spaces.
fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 5 {
        return false;
    }
    trimmed.matches('\t').count() >= 2
        || trimmed.matches('|').count() >= 2
        || count_multi_space_gaps(trimmed) >= 2
}

fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len == 3 {
                count += 1;
            }
        } else {
            gap_len = 0;
        }
    }

    count
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim().trim_matches('|');
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0;

    for ch in trimmed.chars() {
        match ch {
            '\t' | '|' => {
                cells.push(current.trim().to_string());
                current.clear();
                spaces = 0;
            }
            ' ' => {
                spaces += 1;
                current.push(ch);
                if spaces == 3 {
                    cells.push(current.trim().to_string());
                    current.clear();
                }
            }
            _ => {
                if spaces >= 3 {
                    current.clear();
                }
                spaces = 0;
                current.push(ch);
            }
        }
    }
    cells.push(current.trim().to_string());
    cells.retain(|c| !c.is_empty());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Object, Stream, dictionary};

    fn make_test_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = format!("BT /F1 12 Tf 72 700 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_extract_text_skips_out_of_range_pages() {
        let pdf = make_test_pdf(&["Cover", "Contents", "Board report"]);
        let text = PdfExtractor::new().extract_text(&pdf, &[1, 3, 7, 50]).unwrap();
        assert_eq!(text.matches(PAGE_SEPARATOR).count(), 2);
    }

    #[test]
    fn test_extract_text_empty_page_list() {
        let pdf = make_test_pdf(&["Cover"]);
        let text = PdfExtractor::new().extract_text(&pdf, &[]).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let result = PdfExtractor::new().extract_text(b"not a pdf", &[1]);
        assert!(matches!(result, Err(ExtractionError::Pdf(_))));
        let result = PdfExtractor::new().extract_tables(b"not a pdf", &[1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_detect_tables_multi_space_columns() {
        let text = "Statement of Profit and Loss\n\
            Particulars      FY24       FY23\n\
            Revenue from operations      272,524      225,458\n\
            Other income      9,089      6,932\n\
            Notes follow below.";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].columns, vec!["Particulars", "FY24", "FY23"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(
            tables[0].rows[0],
            vec!["Revenue from operations", "272,524", "225,458"]
        );
    }

    #[test]
    fn test_detect_tables_pipe_and_tab_rows() {
        let text = "| Item | Amount |\n| Cash | 9,095 |\n\n\
            Particulars\tFY24\tFY23\nRevenue from operations\t272524\t225458";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].columns, vec!["Item", "Amount"]);
        assert_eq!(tables[0].rows[0], vec!["Cash", "9,095"]);
        assert_eq!(tables[1].columns, vec!["Particulars", "FY24", "FY23"]);
        assert_eq!(tables[1].rows[0], vec!["Revenue from operations", "272524", "225458"]);
    }

    #[test]
    fn test_single_tabular_line_is_not_a_table() {
        let text = "Prose paragraph.\nRevenue      100      200\nMore prose.";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn test_is_tabular_line() {
        assert!(is_tabular_line("Particulars\tFY24\tFY23"));
        assert!(is_tabular_line("Total assets   253,919   230,000"));
        assert!(!is_tabular_line("The company grew in every segment."));
        assert!(!is_tabular_line("a b"));
    }
}
