use std::ffi::OsString;
use std::io;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;
use clap::ValueEnum;

use crate::assemble::{Block, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Txt,
    Html,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Html => "html",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// The four font variants registered with the PDF engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontSet {
    pub regular: PathBuf,
    pub italic: PathBuf,
    pub bold: PathBuf,
    pub bold_italic: PathBuf,
}

impl FontSet {
    /// Finds `{family}-Regular.ttf` (or `{family}.ttf`), `{family}-Italic.ttf`,
    /// `{family}-Bold.ttf` and `{family}-BoldItalic.ttf` in `dir`.
    pub fn locate(dir: &Path, family: &str) -> anyhow::Result<Self> {
        let find = |variant: &str, candidates: &[String]| -> anyhow::Result<PathBuf> {
            candidates
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "missing {variant} font for {family:?} in {} (looked for {})",
                        dir.display(),
                        candidates.join(", ")
                    )
                })
        };

        let fonts = Self {
            regular: find(
                "regular",
                &[format!("{family}-Regular.ttf"), format!("{family}.ttf")],
            )?,
            italic: find("italic", &[format!("{family}-Italic.ttf")])?,
            bold: find("bold", &[format!("{family}-Bold.ttf")])?,
            bold_italic: find("bold-italic", &[format!("{family}-BoldItalic.ttf")])?,
        };
        Ok(fonts)
    }

    fn stylesheet(&self) -> anyhow::Result<String> {
        let mut css = String::new();
        for (path, weight, style) in [
            (&self.regular, "normal", "normal"),
            (&self.italic, "normal", "italic"),
            (&self.bold, "bold", "normal"),
            (&self.bold_italic, "bold", "italic"),
        ] {
            let path = std::path::absolute(path)
                .with_context(|| format!("resolve font path: {}", path.display()))?;
            let url = url::Url::from_file_path(&path)
                .map_err(|()| anyhow::anyhow!("font path is not absolute: {}", path.display()))?;
            css.push_str(&format!(
                "@font-face {{ font-family: \"ficbookify\"; src: url(\"{url}\"); font-weight: {weight}; font-style: {style}; }}\n"
            ));
        }
        css.push_str(BODY_CSS);
        Ok(css)
    }
}

const BODY_CSS: &str = "body { font-family: \"ficbookify\", serif; }\n\
.section-break { page-break-after: always; }\n\
.meta { margin: 0; }\n";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub format: OutputFormat,
    pub force: bool,
    pub pandoc: String,
    pub fonts: Option<FontSet>,
}

pub fn output_path(options: &ExportOptions, stem: &str) -> PathBuf {
    options
        .out_dir
        .join(format!("{stem}.{}", options.format.extension()))
}

/// Checks that the artifact can be written before any page is fetched.
pub fn preflight(options: &ExportOptions, stem: &str) -> anyhow::Result<PathBuf> {
    let out_path = output_path(options, stem);
    if out_path.exists() && !options.force {
        anyhow::bail!("export output already exists: {}", out_path.display());
    }
    if options.format == OutputFormat::Pdf && options.fonts.is_none() {
        anyhow::bail!("pdf export requires a font set");
    }
    Ok(out_path)
}

/// Writes the document to a temporary file in the output directory and
/// moves it into place only once it is complete.
pub fn write_document(
    document: &Document,
    stem: &str,
    options: &ExportOptions,
) -> anyhow::Result<PathBuf> {
    let out_path = preflight(options, stem)?;
    std::fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("create export output dir: {}", options.out_dir.display()))?;

    let staged = tempfile::Builder::new()
        .prefix(".ficbookify-")
        .suffix(&format!(".{}", options.format.extension()))
        .tempfile_in(&options.out_dir)
        .with_context(|| format!("create staging file in {}", options.out_dir.display()))?;

    match options.format {
        OutputFormat::Txt => write_staged(&staged, render_text(document).as_bytes())?,
        OutputFormat::Html => write_staged(&staged, render_html(document, None).as_bytes())?,
        OutputFormat::Pdf => {
            let fonts = options
                .fonts
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("pdf export requires a font set"))?;
            export_pdf_via_pandoc(document, fonts, &options.pandoc, staged.path())?;
        }
    }

    let persisted = if options.force {
        staged.persist(&out_path)
    } else {
        staged.persist_noclobber(&out_path)
    };
    persisted
        .map_err(|err| err.error)
        .with_context(|| format!("finalize export output: {}", out_path.display()))?;

    tracing::info!(out = %out_path.display(), format = options.format.extension(), "wrote document");
    Ok(out_path)
}

fn write_staged(staged: &tempfile::NamedTempFile, contents: &[u8]) -> anyhow::Result<()> {
    let mut file = staged.as_file();
    file.write_all(contents)
        .with_context(|| format!("write staging file: {}", staged.path().display()))?;
    file.flush()
        .with_context(|| format!("flush staging file: {}", staged.path().display()))?;
    Ok(())
}

pub fn render_text(document: &Document) -> String {
    let mut out = String::new();
    let mut previous: Option<&Block> = None;
    for block in &document.blocks {
        let text = match block {
            Block::Title(title) => title.clone(),
            Block::MetaLine { label, value } => format!("{label}: {value}"),
            Block::Summary(summary) => summary.clone(),
            Block::ChapterHeading(title) => title.clone(),
            Block::Paragraph(fragment) => fragment.plain_text(),
            Block::SectionBreak => "\u{c}".to_owned(),
        };
        match previous {
            None => {}
            Some(Block::MetaLine { .. }) if matches!(block, Block::MetaLine { .. }) => {
                out.push('\n');
            }
            Some(_) => out.push_str("\n\n"),
        }
        out.push_str(&text);
        previous = Some(block);
    }
    out.push('\n');
    out
}

pub fn render_html(document: &Document, stylesheet: Option<&str>) -> String {
    let title = html_escape::encode_text(&document.title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{title}</title>\n"));
    if let Some(css) = stylesheet {
        out.push_str(&format!("<style>\n{css}</style>\n"));
    }
    out.push_str("</head>\n<body>\n");

    for block in &document.blocks {
        match block {
            Block::Title(title) => {
                out.push_str(&format!("<h1>{}</h1>\n", html_escape::encode_text(title)));
            }
            Block::MetaLine { label, value } => {
                out.push_str(&format!(
                    "<p class=\"meta\"><strong>{label}:</strong> {}</p>\n",
                    html_escape::encode_text(value)
                ));
            }
            Block::Summary(summary) => {
                out.push_str(&format!(
                    "<blockquote>{}</blockquote>\n",
                    html_escape::encode_text(summary)
                ));
            }
            Block::ChapterHeading(title) => {
                out.push_str(&format!("<h2>{}</h2>\n", html_escape::encode_text(title)));
            }
            Block::Paragraph(fragment) => {
                out.push_str(&format!("<p>{}</p>\n", fragment.to_html()));
            }
            Block::SectionBreak => out.push_str("<div class=\"section-break\"></div>\n"),
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn export_pdf_via_pandoc(
    document: &Document,
    fonts: &FontSet,
    pandoc: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let work_dir = tempfile::TempDir::new().context("create pdf work dir")?;
    let css = fonts.stylesheet()?;
    let css_path = work_dir.path().join("fonts.css");
    std::fs::write(&css_path, &css)
        .with_context(|| format!("write stylesheet: {}", css_path.display()))?;
    let html_path = work_dir.path().join("document.html");
    std::fs::write(&html_path, render_html(document, Some(&css)))
        .with_context(|| format!("write html: {}", html_path.display()))?;

    tracing::info!(
        format = "pdf",
        pdf_engine = "weasyprint",
        pandoc = %pandoc,
        "export via pandoc"
    );

    let pandoc_args = build_pandoc_args(&html_path, &css_path, out, &document.title);
    let output = run_pandoc(pandoc, &pandoc_args)?;
    if !output.status.success() {
        anyhow::bail!(
            "pandoc failed with pdf_engine=weasyprint ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

fn build_pandoc_args(input: &Path, css: &Path, out: &Path, title: &str) -> Vec<OsString> {
    let mut pandoc_args = vec![
        input.as_os_str().to_owned(),
        OsString::from("-o"),
        out.as_os_str().to_owned(),
        OsString::from("--from"),
        OsString::from("html"),
        OsString::from("--to"),
        OsString::from("html5"),
        OsString::from("--pdf-engine"),
        OsString::from("weasyprint"),
        OsString::from("--css"),
        css.as_os_str().to_owned(),
    ];
    if !title.trim().is_empty() {
        pandoc_args.push(OsString::from("--metadata"));
        pandoc_args.push(OsString::from(format!("title={title}")));
    }
    pandoc_args
}

fn run_pandoc(pandoc: &str, pandoc_args: &[OsString]) -> anyhow::Result<std::process::Output> {
    match Command::new(pandoc).args(pandoc_args).output() {
        Ok(output) => Ok(output),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            anyhow::bail!("pandoc not found ({pandoc}); install pandoc or pass `--pandoc <PATH>`")
        }
        Err(err) => Err(err).with_context(|| format!("run pandoc: {pandoc}")),
    }
}
