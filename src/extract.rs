//! Text extraction for the supported document formats.
//!
//! PDFs are extracted page by page so each page can become its own
//! document with a page number. OOXML formats (`.docx`, `.pptx`, `.xlsx`)
//! are unzipped and their text runs collected; paragraph and row ends become
//! newlines so the chunker can split on them. Markdown and plain text are
//! decoded as UTF-8.

use quick_xml::events::Event;
use std::io::Read;
use std::path::Path;

/// Maximum sheets to read from a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to read per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Document formats the loader understands, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    PlainText,
}

impl Format {
    /// Format for `path`'s extension (case-insensitive), if supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            "pptx" => Some(Format::Pptx),
            "xlsx" => Some(Format::Xlsx),
            "md" | "markdown" | "txt" => Some(Format::PlainText),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Ooxml(String),
    Encoding(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Encoding(e) => write!(f, "text is not valid UTF-8: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracted text of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// One entry per page, in page order.
    Pages(Vec<String>),
    Whole(String),
}

/// Extract text from `bytes` in the given format.
pub fn extract(bytes: &[u8], format: Format) -> Result<Extracted, ExtractError> {
    match format {
        Format::Pdf => extract_pdf_pages(bytes).map(Extracted::Pages),
        Format::Docx => extract_docx(bytes).map(Extracted::Whole),
        Format::Pptx => extract_pptx(bytes).map(Extracted::Whole),
        Format::Xlsx => extract_xlsx(bytes).map(Extracted::Whole),
        Format::PlainText => String::from_utf8(bytes.to_vec())
            .map(Extracted::Whole)
            .map_err(|e| ExtractError::Encoding(e.to_string())),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Numbered parts such as `ppt/slides/slide12.xml`, in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collect the text of every `<*:t>` element; each `<*:p>` end adds a newline.
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    paragraph_text(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let text = paragraph_text(&read_entry(&mut archive, &name)?)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match archive.index_for_name("xl/sharedStrings.xml") {
        Some(_) => shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?,
        None => Vec::new(),
    };

    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let text = sheet_text(&read_entry(&mut archive, &name)?, &shared)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    let text = te
                        .unescape()
                        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cells joined by spaces, rows by newlines. Shared-string cells are
/// resolved; other values are kept verbatim.
fn sheet_text(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_v = false;
    let mut is_shared = false;
    let mut cells = 0usize;

    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    is_shared = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_v => {
                let raw = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let value = raw.trim();
                if !value.is_empty() {
                    let cell = if is_shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(cell) = cell {
                        row.push(cell);
                        cells += 1;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => is_shared = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a/B.PDF")), Some(Format::Pdf));
        assert_eq!(Format::from_path(Path::new("notes.md")), Some(Format::PlainText));
        assert_eq!(Format::from_path(Path::new("deck.pptx")), Some(Format::Pptx));
        assert_eq!(Format::from_path(Path::new("image.png")), None);
        assert_eq!(Format::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        let err = extract(b"not a pdf", Format::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_is_error() {
        let err = extract(b"not a zip", Format::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn test_plain_text_must_be_utf8() {
        assert_eq!(
            extract("línea".as_bytes(), Format::PlainText).unwrap(),
            Extracted::Whole("línea".to_string())
        );
        let err = extract(&[0xff, 0xfe, 0x00], Format::PlainText).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let doc = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t xml:space="preserve">Milk must be </w:t></w:r><w:r><w:t>cooled.</w:t></w:r></w:p>
<w:p><w:r><w:t>Store at 4 &amp; below.</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = zip_of(&[("word/document.xml", doc)]);
        assert_eq!(
            extract(&bytes, Format::Docx).unwrap(),
            Extracted::Whole("Milk must be cooled.\nStore at 4 & below.".to_string())
        );
    }

    #[test]
    fn test_docx_without_body_is_error() {
        let bytes = zip_of(&[("other.xml", "<x/>")]);
        assert!(extract(&bytes, Format::Docx).is_err());
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let slide = |t: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#,
                t
            )
        };
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let bytes = zip_of(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        assert_eq!(
            extract(&bytes, Format::Pptx).unwrap(),
            Extracted::Whole("first\n\nsecond\n\ntenth".to_string())
        );
    }

    #[test]
    fn test_xlsx_rows_and_shared_strings() {
        let shared = r#"<sst xmlns="x"><si><t>Species</t></si><si><t>Bovine</t></si></sst>"#;
        let sheet = r#"<worksheet xmlns="x"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>12</v></c></row>
<row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>3.5</v></c></row>
</sheetData></worksheet>"#;
        let bytes = zip_of(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(
            extract(&bytes, Format::Xlsx).unwrap(),
            Extracted::Whole("Species 12\nBovine 3.5".to_string())
        );
    }
}
