//! Spreadsheet export with inline images.
//!
//! Export runs in two steps. [`Exporter::prepare`] flattens records into an
//! [`ExportPlan`] and fetches images; [`write_workbook`] serializes the plan
//! with `rust_xlsxwriter`. Data cells and image anchors both take their row
//! from [`sheet_row`], so an image can only land on the row of the record it
//! was fetched for.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use image::ImageFormat;
use rust_xlsxwriter::{Format, Image, Workbook};
use tracing::{info, warn};

use crate::acquire::http_client::HttpClient;
use crate::types::{ExportColumn, ExportError, ExportSchema, ExportWarning, Record};

/// Row height (points) for rows carrying an embedded image.
const IMAGE_ROW_HEIGHT: f64 = 60.0;

/// Most characters Excel stores in one cell.
pub const MAX_CELL_CHARS: usize = 32_767;

const MAX_SHEET_NAME_CHARS: usize = 31;
const SHEET_NAME_FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Check `name` against Excel's worksheet naming rules.
pub fn validate_sheet_name(name: &str) -> Result<(), ExportError> {
    let problem = if name.is_empty() {
        Some("is empty".to_string())
    } else if name.chars().count() > MAX_SHEET_NAME_CHARS {
        Some(format!("is longer than {MAX_SHEET_NAME_CHARS} characters"))
    } else if let Some(c) = name.chars().find(|c| SHEET_NAME_FORBIDDEN.contains(c)) {
        Some(format!("contains '{c}'"))
    } else if name.starts_with('\'') || name.ends_with('\'') {
        Some("starts or ends with an apostrophe".to_string())
    } else {
        None
    };
    match problem {
        Some(p) => Err(ExportError::Encoding(format!("sheet name '{name}' {p}"))),
        None => Ok(()),
    }
}

/// Clip `text` to [`MAX_CELL_CHARS`] on a char boundary. Returns whether it
/// was clipped.
fn clip_cell(text: &mut String) -> bool {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => {
            text.truncate(end);
            true
        }
        None => false,
    }
}

/// Worksheet row for the record at `index`. Row 0 is the header.
pub fn sheet_row(index: usize) -> u32 {
    index as u32 + 1
}

/// Image bytes ready to embed, in a format the workbook accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub source_url: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Flattened view of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// Position of the source record in the exported sequence.
    pub index: usize,
    /// One cell per schema column.
    pub cells: Vec<String>,
    pub image: Option<EmbeddedImage>,
}

/// Everything needed to write the workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub sheet_name: String,
    pub columns: Vec<ExportColumn>,
    pub rows: Vec<ExportRow>,
    pub warnings: Vec<ExportWarning>,
}

impl ExportPlan {
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    pub fn image_column(&self) -> Option<u16> {
        self.columns.iter().position(|c| c.image).map(|c| c as u16)
    }

    /// `(row, column, image)` for every embedded image, in row order.
    pub fn image_anchors(&self) -> Vec<(u32, u16, &EmbeddedImage)> {
        let Some(col) = self.image_column() else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.image.as_ref().map(|img| (sheet_row(row.index), col, img)))
            .collect()
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub path: PathBuf,
    pub rows_written: usize,
    pub images_embedded: usize,
    pub warnings: Vec<ExportWarning>,
}

/// Writes record sequences to `.xlsx` workbooks.
pub struct Exporter {
    http: HttpClient,
    image_timeout_ms: u64,
    concurrency: usize,
}

impl Exporter {
    pub fn new(http: HttpClient, image_timeout_ms: u64, concurrency: usize) -> Self {
        Self {
            http,
            image_timeout_ms,
            concurrency: concurrency.max(1),
        }
    }

    /// Export `records` to `path`, replacing any existing file.
    pub async fn export(
        &self,
        records: &[Record],
        schema: &ExportSchema,
        path: &Path,
    ) -> Result<ExportResult, ExportError> {
        let plan = self.prepare(records, schema).await?;
        write(plan, path).await
    }

    /// Flatten records and fetch their images.
    ///
    /// Image failures and oversized cells are soft: the row loses its image
    /// or keeps a clipped value, and an [`ExportWarning`] is recorded.
    pub async fn prepare(
        &self,
        records: &[Record],
        schema: &ExportSchema,
    ) -> Result<ExportPlan, ExportError> {
        validate_sheet_name(&schema.sheet_name)?;
        if schema.columns.iter().filter(|c| c.image).count() > 1 {
            return Err(ExportError::Encoding(
                "export schema declares more than one image column".into(),
            ));
        }
        let image_key = schema
            .image_column()
            .map(|i| schema.columns[i].key.as_str());

        let fetched: Vec<(ExportRow, Vec<ExportWarning>)> = stream::iter(records.iter().enumerate())
            .map(|(index, record)| async move {
                let mut warnings = Vec::new();
                let cells = schema
                    .columns
                    .iter()
                    .map(|c| {
                        let mut text = record.text(&c.key).to_string();
                        if clip_cell(&mut text) {
                            warn!(row = index, column = %c.header, "cell clipped to {MAX_CELL_CHARS} characters");
                            warnings.push(ExportWarning {
                                row: index,
                                url: record.source_url.clone(),
                                reason: format!("'{}' truncated to {MAX_CELL_CHARS} characters", c.header),
                            });
                        }
                        text
                    })
                    .collect();
                let image_url = image_key.map(|k| record.text(k)).unwrap_or("");

                let image = if image_url.is_empty() {
                    None
                } else {
                    match self.fetch_image(image_url).await {
                        Ok(img) => Some(img),
                        Err(reason) => {
                            warn!(row = index, url = image_url, "image skipped: {reason}");
                            warnings.push(ExportWarning {
                                row: index,
                                url: image_url.to_string(),
                                reason,
                            });
                            None
                        }
                    }
                };
                (ExportRow { index, cells, image }, warnings)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut plan = ExportPlan {
            sheet_name: schema.sheet_name.clone(),
            columns: schema.columns.clone(),
            rows: Vec::with_capacity(fetched.len()),
            warnings: Vec::new(),
        };
        for (row, warnings) in fetched {
            plan.rows.push(row);
            plan.warnings.extend(warnings);
        }
        Ok(plan)
    }

    async fn fetch_image(&self, url: &str) -> Result<EmbeddedImage, String> {
        let resp = self
            .http
            .get_with_timeout(url, self.image_timeout_ms)
            .await
            .map_err(|e| e.to_string())?;
        let (format, bytes) = embeddable_image(&resp.body)?;
        Ok(EmbeddedImage {
            source_url: url.to_string(),
            format,
            bytes,
        })
    }
}

/// Detect the real encoding of `bytes` and return something the workbook
/// can embed: PNG, JPEG, GIF and BMP pass through; other decodable formats
/// are transcoded to PNG.
pub fn embeddable_image(bytes: &[u8]) -> Result<(ImageFormat, Vec<u8>), String> {
    let format = image::guess_format(bytes).map_err(|e| format!("unrecognized image data: {e}"))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| format!("undecodable {format:?} image: {e}"))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp => {
            Ok((format, bytes.to_vec()))
        }
        _ => {
            let mut buf = Vec::new();
            decoded
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| format!("failed to transcode {format:?} to PNG: {e}"))?;
            Ok((ImageFormat::Png, buf))
        }
    }
}

/// Write a prepared plan to `path` off the async runtime.
pub async fn write(plan: ExportPlan, path: &Path) -> Result<ExportResult, ExportError> {
    let target = path.to_path_buf();
    let (plan, write_warnings) = tokio::task::spawn_blocking(move || {
        let warnings = write_workbook(&plan, &target)?;
        Ok::<_, ExportError>((plan, warnings))
    })
    .await
    .map_err(|e| ExportError::Io(std::io::Error::other(e)))??;

    let images_embedded = plan.image_anchors().len() - write_warnings.len();
    let mut warnings = plan.warnings;
    warnings.extend(write_warnings);

    info!(
        path = %path.display(),
        rows = plan.rows.len(),
        images = images_embedded,
        "Workbook written"
    );

    Ok(ExportResult {
        path: path.to_path_buf(),
        rows_written: plan.rows.len(),
        images_embedded,
        warnings,
    })
}

/// Serialize a plan as a single-sheet workbook, replacing any existing file.
///
/// Returns warnings for images the workbook refused. On error no file is
/// left at `path`.
pub fn write_workbook(plan: &ExportPlan, path: &Path) -> Result<Vec<ExportWarning>, ExportError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let result = build_and_save(plan, path);
    if result.is_err() && path.exists() {
        let _ = std::fs::remove_file(path);
    }
    result
}

fn build_and_save(plan: &ExportPlan, path: &Path) -> Result<Vec<ExportWarning>, ExportError> {
    let mut warnings = Vec::new();
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&plan.sheet_name)?;

        for (col, column) in plan.columns.iter().enumerate() {
            let col = col as u16;
            worksheet.set_column_width(col, column.width)?;
            worksheet.write_string_with_format(0, col, &column.header, &header_format)?;
        }

        for row in &plan.rows {
            let sheet_row = sheet_row(row.index);
            for (col, cell) in row.cells.iter().enumerate() {
                if !cell.is_empty() {
                    worksheet.write_string(sheet_row, col as u16, cell)?;
                }
            }
        }

        for (sheet_row, col, embedded) in plan.image_anchors() {
            match Image::new_from_buffer(&embedded.bytes) {
                Ok(image) => {
                    worksheet.set_row_height(sheet_row, IMAGE_ROW_HEIGHT)?;
                    worksheet.insert_image_fit_to_cell(sheet_row, col, &image, true)?;
                }
                Err(e) => {
                    warn!(row = sheet_row, url = %embedded.source_url, "workbook rejected image: {e}");
                    warnings.push(ExportWarning {
                        row: (sheet_row - 1) as usize,
                        url: embedded.source_url.clone(),
                        reason: format!("image not embeddable: {e}"),
                    });
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(warnings)
}
