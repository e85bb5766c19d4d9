//! One-page PDF report
//!
//! Writes a minimal PDF 1.4 document: the standard Helvetica fonts with
//! WinAnsi encoding, one content stream, and optionally a JPEG logo embedded
//! as-is through the DCT filter.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::{metric_lines, title};
use crate::athlete::AthleteInfo;
use crate::error::AnalysisError;
use crate::session::Analysis;

/// A4 in points
const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;

const MARGIN_LEFT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 40.0;
const LINE_HEIGHT: f64 = 15.0;
const LOGO_WIDTH: f64 = 80.0;
const BODY_FONT_SIZE: f64 = 12.0;

/// JPEG image with the header fields a PDF image XObject needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegImage {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    data: Vec<u8>,
}

impl JpegImage {
    /// Read dimensions from the first start-of-frame segment
    pub fn parse(data: Vec<u8>) -> Result<Self, AnalysisError> {
        if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
            return Err(AnalysisError::Report("logo is not a JPEG file".to_string()));
        }

        let mut i = 2;
        while i + 4 <= data.len() {
            if data[i] != 0xFF {
                return Err(AnalysisError::Report(format!(
                    "malformed JPEG marker at byte {}",
                    i
                )));
            }
            let marker = data[i + 1];
            if marker == 0xFF {
                i += 1;
                continue;
            }
            if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
                i += 2;
                continue;
            }

            let segment_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            let is_sof = (0xC0..=0xCF).contains(&marker) && ![0xC4, 0xC8, 0xCC].contains(&marker);
            if is_sof {
                if i + 9 >= data.len() {
                    break;
                }
                let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
                let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
                let components = data[i + 9];
                if width == 0 || height == 0 {
                    return Err(AnalysisError::Report("JPEG has zero size".to_string()));
                }
                return Ok(Self {
                    width,
                    height,
                    components,
                    data,
                });
            }
            i += 2 + segment_len;
        }

        Err(AnalysisError::Report(
            "JPEG has no frame header".to_string(),
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        Self::parse(fs::read(path)?)
    }

    fn color_space(&self) -> &'static str {
        match self.components {
            1 => "/DeviceGray",
            4 => "/DeviceCMYK",
            _ => "/DeviceRGB",
        }
    }
}

/// Load the logo, or `None` with a warning when it is missing or unreadable
pub fn load_logo(path: &Path) -> Option<JpegImage> {
    match JpegImage::from_path(path) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "logo unavailable, report generated without it");
            None
        }
    }
}

/// Write the report to `path`
pub fn write_pdf(
    analysis: &Analysis,
    athlete: Option<&AthleteInfo>,
    logo: Option<&Path>,
    path: &Path,
) -> Result<(), AnalysisError> {
    let logo = logo.and_then(load_logo);
    let bytes = render_pdf(analysis, athlete, logo.as_ref());
    fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "report written");
    Ok(())
}

/// Render the report as PDF bytes
pub fn render_pdf(
    analysis: &Analysis,
    athlete: Option<&AthleteInfo>,
    logo: Option<&JpegImage>,
) -> Vec<u8> {
    let mut content = ContentStream::default();

    if let Some(image) = logo {
        let height = LOGO_WIDTH * image.height as f64 / image.width as f64;
        content.image("Im1", MARGIN_LEFT, PAGE_HEIGHT - 100.0, LOGO_WIDTH, height);
    }

    content.text("F2", 16.0, 140.0, PAGE_HEIGHT - 60.0, &title(analysis));
    content.text(
        "F1",
        10.0,
        140.0,
        PAGE_HEIGHT - 76.0,
        &format!(
            "Generated {}",
            analysis.computed_at.format("%Y-%m-%d %H:%M UTC")
        ),
    );

    let mut body: Vec<String> = Vec::new();
    if let Some(info) = athlete {
        body.extend(info.entries().iter().map(|(k, v)| format!("{}: {}", k, v)));
        body.push(String::new());
    }
    let b = analysis.boundaries;
    body.push(format!(
        "Phase boundaries: t1 = {} s, t2 = {} s, t3 = {} s",
        b.t1, b.t2, b.t3
    ));
    body.push(String::new());
    body.push("--- Results ---".to_string());
    body.extend(
        metric_lines(analysis)
            .iter()
            .map(|l| format!("{}: {}", l.label, l.formatted_value())),
    );

    let mut y = PAGE_HEIGHT - 130.0;
    for line in &body {
        if y < MARGIN_BOTTOM {
            warn!("report truncated at the bottom of the page");
            break;
        }
        if !line.is_empty() {
            content.text("F1", BODY_FONT_SIZE, MARGIN_LEFT, y, line);
        }
        y -= LINE_HEIGHT;
    }

    let mut doc = PdfDocument::new();
    doc.object(b"<< /Type /Catalog /Pages 2 0 R >>");
    doc.object(b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");

    let xobjects = if logo.is_some() {
        " /XObject << /Im1 7 0 R >>"
    } else {
        ""
    };
    doc.object(
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >>{} >> /Contents 6 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT, xobjects
        )
        .as_bytes(),
    );
    doc.object(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    doc.object(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );
    doc.stream("", &content.bytes);

    if let Some(image) = logo {
        doc.stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} \
                 /BitsPerComponent 8 /Filter /DCTDecode",
                image.width,
                image.height,
                image.color_space()
            ),
            &image.data,
        );
    }

    doc.finish()
}

/// Page drawing operators
#[derive(Default)]
struct ContentStream {
    bytes: Vec<u8>,
}

impl ContentStream {
    fn text(&mut self, font: &str, size: f64, x: f64, y: f64, text: &str) {
        self.bytes
            .extend_from_slice(format!("BT /{} {} Tf {} {} Td ", font, size, x, y).as_bytes());
        self.bytes.extend_from_slice(&encode_string(text));
        self.bytes.extend_from_slice(b" Tj ET\n");
    }

    fn image(&mut self, name: &str, x: f64, y: f64, width: f64, height: f64) {
        self.bytes.extend_from_slice(
            format!("q {} 0 0 {} {} {} cm /{} Do Q\n", width, height, x, y, name).as_bytes(),
        );
    }
}

/// Object table and cross-reference bookkeeping
struct PdfDocument {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfDocument {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn begin(&mut self) {
        self.offsets.push(self.buf.len());
        let header = format!("{} 0 obj\n", self.offsets.len());
        self.buf.extend_from_slice(header.as_bytes());
    }

    fn object(&mut self, body: &[u8]) {
        self.begin();
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, dict_entries: &str, data: &[u8]) {
        self.begin();
        let dict = if dict_entries.is_empty() {
            format!("<< /Length {} >>\nstream\n", data.len())
        } else {
            format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len())
        };
        self.buf.extend_from_slice(dict.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len() + 1,
            xref_offset
        ));
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

/// PDF literal string in WinAnsi encoding; unmappable characters become '?'
fn encode_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            ' '..='~' => out.push(c as u8),
            '\u{A0}'..='\u{FF}' => out.push(c as u32 as u8),
            '€' => out.push(0x80),
            '…' => out.push(0x85),
            '‘' => out.push(0x91),
            '’' => out.push(0x92),
            '“' => out.push(0x93),
            '”' => out.push(0x94),
            '•' => out.push(0x95),
            '–' => out.push(0x96),
            '—' => out.push(0x97),
            c if c.is_control() => out.push(b' '),
            _ => out.push(b'?'),
        }
    }
    out.push(b')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::reference_analysis;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn tiny_jpeg() -> Vec<u8> {
        vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, // APP0, empty payload
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x20, 0x00, 0x40, 0x03, 0x01, 0x22, 0x00, // SOF0 64x32
            0xFF, 0xD9, // EOI
        ]
    }

    #[test]
    fn test_parse_jpeg_header() {
        let image = JpegImage::parse(tiny_jpeg()).unwrap();
        assert_eq!((image.width, image.height, image.components), (64, 32, 3));
        assert_eq!(image.color_space(), "/DeviceRGB");

        assert!(JpegImage::parse(b"\x89PNG\r\n".to_vec()).is_err());
        assert!(JpegImage::parse(vec![0xFF, 0xD8, 0xFF, 0xD9]).is_err());
    }

    #[test]
    fn test_encode_string() {
        assert_eq!(encode_string("a (b) \\"), b"(a \\(b\\) \\\\)".to_vec());
        assert_eq!(encode_string("é½"), vec![b'(', 0xE9, 0xBD, b')']);
        assert_eq!(encode_string("ΔP"), b"(?P)".to_vec());
    }

    #[test]
    fn test_render_pdf_structure() {
        let info = AthleteInfo::parse("Name: Jane Doe\n");
        let pdf = render_pdf(&reference_analysis(), Some(&info), None);

        assert!(pdf.starts_with(b"%PDF-1.4\n"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(contains(&pdf, b"(Name: Jane Doe)"));
        assert!(contains(&pdf, b"(Fatigue index \\(%\\): 20.0)"));
        assert!(contains(&pdf, b"(Time to power loss \\(s\\): not detected)"));
        assert!(!contains(&pdf, b"/XObject"));

        // startxref must point at the xref table
        let text = String::from_utf8_lossy(&pdf);
        let offset: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.trim().parse().ok())
            .unwrap();
        assert!(pdf[offset..].starts_with(b"xref\n0 7\n"));
    }

    #[test]
    fn test_render_pdf_with_logo() {
        let logo = JpegImage::parse(tiny_jpeg()).unwrap();
        let pdf = render_pdf(&reference_analysis(), None, Some(&logo));

        assert!(contains(&pdf, b"/XObject << /Im1 7 0 R >>"));
        assert!(contains(&pdf, b"/Width 64 /Height 32"));
        assert!(contains(&pdf, b"/Im1 Do"));
    }

    #[test]
    fn test_missing_logo_is_tolerated() {
        assert!(load_logo(Path::new("/nonexistent/logo.jpg")).is_none());

        let dir = std::env::temp_dir().join(format!("allout-report-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let out = dir.join("report.pdf");
        write_pdf(
            &reference_analysis(),
            None,
            Some(Path::new("/nonexistent/logo.jpg")),
            &out,
        )
        .unwrap();

        let written = fs::read(&out).unwrap();
        assert!(written.starts_with(b"%PDF"));
        let _ = fs::remove_dir_all(&dir);
    }
}
