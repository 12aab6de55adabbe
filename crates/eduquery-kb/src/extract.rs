//! Per-format document text extraction.
//!
//! Each format is one [`TextExtractor`]; [`ExtractorSet`] picks one by file
//! extension so the builder never branches on format itself.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use zip::ZipArchive;

use eduquery_core::{KbError, Result, TextExtractor};

use crate::preprocess::preprocess;

static DOCX_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").unwrap());

/// Text runs plus the break and tab elements between them.
static DOCX_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(?P<text>.*?)</w:t>|(?P<tab><w:tab\b[^>]*/>)|<w:(?:br|cr)\b[^>]*/>")
        .unwrap()
});

static DRAWING_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a:p>.*?</a:p>").unwrap());

static DRAWING_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a:t>(?P<text>.*?)</a:t>|<a:br\b[^>]*/>").unwrap());

static SLIDE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

static XML_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#x[0-9a-fA-F]+);").unwrap());

/// Decode the predefined XML entities and numeric character references.
///
/// One pass, so `&amp;lt;` stays `&lt;`. Invalid code points are kept as
/// written.
fn unescape_xml(text: &str) -> String {
    XML_ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let decoded = match &caps[1] {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                numeric => {
                    let code = match numeric.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => numeric[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Run text of every paragraph in an XML part, skipping empty paragraphs.
///
/// Tabs inside a paragraph become a space and line breaks a newline.
fn paragraphs(xml: &str, paragraph: &Regex, run: &Regex) -> Vec<String> {
    paragraph
        .find_iter(xml)
        .map(|p| {
            run.captures_iter(p.as_str())
                .map(|c| match (c.name("text"), c.name("tab")) {
                    (Some(text), _) => unescape_xml(text.as_str()),
                    (None, Some(_)) => " ".to_string(),
                    (None, None) => "\n".to_string(),
                })
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| KbError::extraction(path.display().to_string(), e.to_string()))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str, path: &Path) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| KbError::extraction(path.display().to_string(), format!("{}: {}", name, e)))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// `.txt` and `.md` files, read as UTF-8 (invalid bytes replaced).
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Word documents: body paragraphs of `word/document.xml`.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let mut archive = open_archive(path)?;
        let xml = read_entry(&mut archive, "word/document.xml", path)?;
        let text = paragraphs(&xml, &DOCX_PARAGRAPH, &DOCX_RUN).join("\n\n");
        Ok(preprocess(&text))
    }
}

/// PowerPoint decks: text frames of every slide, in slide order.
pub struct PptxExtractor;

impl TextExtractor for PptxExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["pptx"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let mut archive = open_archive(path)?;

        // slide10 sorts after slide9
        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = SLIDE_NAME.captures(name)?[1].parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        slides.sort();
        debug!("{:?}: {} slides", path, slides.len());

        let mut sections = Vec::with_capacity(slides.len());
        for (_, name) in &slides {
            let xml = read_entry(&mut archive, name, path)?;
            let lines = paragraphs(&xml, &DRAWING_PARAGRAPH, &DRAWING_RUN);
            if !lines.is_empty() {
                sections.push(lines.join("\n"));
            }
        }
        Ok(preprocess(&sections.join("\n\n")))
    }
}

/// PDF files, text of all pages.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let text = pdf_extract::extract_text(path)
            .map_err(|e| KbError::extraction(path.display().to_string(), e.to_string()))?;
        Ok(preprocess(&text))
    }
}

/// Extractors keyed by lower-case file extension.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorSet {
    /// A set with no extractors.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Add an extractor; it takes precedence over earlier ones for the
    /// extensions it claims.
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.insert(0, extractor);
    }

    /// Extractor responsible for `path`, if any.
    pub fn for_path(&self, path: &Path) -> Option<&dyn TextExtractor> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extractors
            .iter()
            .find(|e| e.extensions().contains(&ext.as_str()))
            .map(|e| e.as_ref())
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

impl Default for ExtractorSet {
    /// Plain text, DOCX, PPTX and PDF.
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(PdfExtractor));
        set.register(Box::new(PptxExtractor));
        set.register(Box::new(DocxExtractor));
        set.register(Box::new(PlainTextExtractor));
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_docx_paragraphs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("calculus.docx");
        write_zip(
            &path,
            &[(
                "word/document.xml",
                r#"<w:document><w:body>
                <w:p w:rsidR="1"><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Calculus</w:t></w:r></w:p>
                <w:p><w:r><w:t xml:space="preserve">Rates of </w:t></w:r><w:r><w:t>change &amp; limits</w:t></w:r></w:p>
                <w:p></w:p>
                </w:body></w:document>"#,
            )],
        );

        let text = DocxExtractor.extract(&path).unwrap();
        assert_eq!(text, "Calculus\n\nRates of change & limits");
    }

    #[test]
    fn test_docx_breaks_tabs_and_character_references() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.docx");
        write_zip(
            &path,
            &[(
                "word/document.xml",
                r#"<w:document><w:body>
                <w:p><w:r><w:t>First line</w:t><w:br/><w:t>Second</w:t></w:r></w:p>
                <w:p><w:r><w:t>Term</w:t><w:tab/><w:t>Newton&#8217;s law &#x41;&amp;lt;</w:t></w:r></w:p>
                </w:body></w:document>"#,
            )],
        );

        let text = DocxExtractor.extract(&path).unwrap();
        assert_eq!(text, "First line\nSecond\n\nTerm Newton\u{2019}s law A&lt;");
    }

    #[test]
    fn test_unescape_keeps_unknown_entities() {
        assert_eq!(unescape_xml("&#65;&#x42; &#xD800; &nbsp;"), "AB &#xD800; &nbsp;");
    }

    #[test]
    fn test_pptx_line_breaks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deck.pptx");
        write_zip(
            &path,
            &[(
                "ppt/slides/slide1.xml",
                "<p:sld><a:p><a:r><a:t>Limits</a:t></a:r><a:br/><a:r><a:t>Continuity</a:t></a:r></a:p></p:sld>",
            )],
        );

        assert_eq!(PptxExtractor.extract(&path).unwrap(), "Limits\nContinuity");
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lecture.pptx");
        let slide = |t: &str| format!("<p:sld><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>", t);
        write_zip(
            &path,
            &[
                ("ppt/slides/slide10.xml", &slide("Ten")),
                ("ppt/slides/slide2.xml", &slide("Two")),
                ("ppt/slides/slide1.xml", &slide("One")),
                ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
            ],
        );

        let text = PptxExtractor.extract(&path).unwrap();
        assert_eq!(text, "One\n\nTwo\n\nTen");
    }

    #[test]
    fn test_not_a_zip_is_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.docx");
        fs::write(&path, b"plain bytes").unwrap();

        let err = DocxExtractor.extract(&path).unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_ERROR");
    }

    #[test]
    fn test_plain_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        fs::write(&path, "# Limits\n\nA limit describes approach.").unwrap();

        assert_eq!(
            PlainTextExtractor.extract(&path).unwrap(),
            "# Limits\n\nA limit describes approach."
        );
    }

    #[test]
    fn test_set_selects_by_extension() {
        let set = ExtractorSet::default();
        assert!(set.supports(Path::new("a/Notes.TXT")));
        assert!(set.supports(Path::new("deck.pptx")));
        assert!(set.supports(Path::new("paper.pdf")));
        assert!(!set.supports(Path::new("image.png")));
        assert!(!set.supports(Path::new("README")));
        assert_eq!(
            set.for_path(Path::new("x.docx")).unwrap().extensions(),
            &["docx"]
        );
    }

    #[test]
    fn test_registered_extractor_wins() {
        struct Upper;
        impl TextExtractor for Upper {
            fn extensions(&self) -> &[&'static str] {
                &["txt"]
            }
            fn extract(&self, _path: &Path) -> Result<String> {
                Ok("OVERRIDE".to_string())
            }
        }

        let mut set = ExtractorSet::default();
        set.register(Box::new(Upper));
        let text = set
            .for_path(Path::new("x.txt"))
            .unwrap()
            .extract(Path::new("x.txt"))
            .unwrap();
        assert_eq!(text, "OVERRIDE");
    }
}
