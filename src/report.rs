//! Repair history export.
//!
//! [`HistoryReport::build`] selects and formats the rows; [`HistoryReport::render_pdf`]
//! lays them out on A4 pages with the workshop logo on top.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use printpdf::{
  BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
  PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};

use crate::backend::types::{Asset, Machine, Repair, Vehicle};
use crate::backend::WorkshopClient;
use crate::config::Config;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const LOGO_W: f32 = 30.0;
const FONT_SIZE: f32 = 8.0;
const LINE_H: f32 = 3.5;
const PAD: f32 = 1.5;
const PT_TO_MM: f32 = 0.3528;

const COLUMNS: [(&str, f32); 6] = [
  ("Date", 30.0),
  ("Asset", 30.0),
  ("Status", 20.0),
  ("Description", 40.0),
  ("Start", 30.0),
  ("Completion", 30.0),
];

const HEADER_FILL: (f32, f32, f32) = (66.0 / 255.0, 139.0 / 255.0, 202.0 / 255.0);
const ALT_ROW_FILL: (f32, f32, f32) = (245.0 / 255.0, 245.0 / 255.0, 245.0 / 255.0);

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
  #[error("failed to build PDF: {0}")]
  Pdf(#[from] printpdf::Error),

  #[error("failed to write report to {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Which repairs go into the report
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AssetFilter {
  #[default]
  All,
  Only(Asset),
}

impl AssetFilter {
  pub fn matches(&self, repair: &Repair) -> bool {
    match self {
      AssetFilter::All => true,
      AssetFilter::Only(asset) => repair.asset_ref == asset.asset_ref(),
    }
  }

  pub fn label(&self) -> String {
    match self {
      AssetFilter::All => "All assets".to_string(),
      AssetFilter::Only(asset) => asset.label(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
  pub date: String,
  pub asset: String,
  pub status: String,
  pub description: String,
  pub started: String,
  pub completed: String,
}

impl ReportRow {
  fn cells(&self) -> [&str; 6] {
    [
      &self.date,
      &self.asset,
      &self.status,
      &self.description,
      &self.started,
      &self.completed,
    ]
  }
}

#[derive(Debug, Clone)]
pub struct HistoryReport {
  pub generated_by: String,
  pub generated_at: DateTime<Local>,
  /// Set when the report covers a single asset
  pub asset: Option<String>,
  pub rows: Vec<ReportRow>,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()
}

impl HistoryReport {
  pub fn build(
    repairs: &[Repair],
    filter: &AssetFilter,
    generated_by: &str,
    now: DateTime<Local>,
  ) -> Self {
    let mut selected: Vec<&Repair> = repairs.iter().filter(|r| filter.matches(r)).collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let rows = selected
      .into_iter()
      .map(|repair| ReportRow {
        date: format_timestamp(&repair.created_at),
        asset: repair.asset_label(),
        status: repair.status.label().to_string(),
        description: repair.description.clone(),
        started: format_timestamp(&repair.started_at),
        completed: repair
          .completed_at
          .as_ref()
          .map(format_timestamp)
          .unwrap_or_else(|| "-".to_string()),
      })
      .collect();

    Self {
      generated_by: generated_by.to_string(),
      generated_at: now,
      asset: match filter {
        AssetFilter::All => None,
        AssetFilter::Only(asset) => Some(asset.label()),
      },
      rows,
    }
  }

  pub fn file_name(&self) -> String {
    format!(
      "repair_history_{}.pdf",
      self.generated_at.format("%Y-%m-%d_%H-%M")
    )
  }

  /// Render to PDF bytes. An undecodable logo is skipped.
  pub fn render_pdf(&self, logo: Option<&[u8]>) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) = PdfDocument::new("Repair history", Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
    let layer = doc.get_page(page).get_layer(layer);

    if let Some(bytes) = logo {
      draw_logo(&layer, bytes);
    }

    set_fill(&layer, (0.0, 0.0, 0.0));
    layer.use_text("Repair History", 16.0, Mm(50.0), y(25.0), &bold);
    layer.use_text(
      pdf_text(&format!("Generated by: {}", self.generated_by)),
      10.0,
      Mm(MARGIN),
      y(40.0),
      &regular,
    );
    layer.use_text(
      format!("Date: {}", self.generated_at.format("%d/%m/%Y %H:%M")),
      10.0,
      Mm(MARGIN),
      y(45.0),
      &regular,
    );
    if let Some(asset) = &self.asset {
      layer.use_text(
        pdf_text(&format!("Asset: {}", asset)),
        10.0,
        Mm(MARGIN),
        y(50.0),
        &regular,
      );
    }

    let start = if self.asset.is_some() { 55.0 } else { 50.0 };
    let mut table = Table {
      doc: &doc,
      layer,
      top: start,
      regular,
      bold,
    };
    table.header();
    for (i, row) in self.rows.iter().enumerate() {
      table.row(row, i % 2 == 1);
    }

    Ok(doc.save_to_bytes()?)
  }

  /// Render and write into `dir`, returning the file path.
  pub fn write_to(&self, dir: &Path, logo: Option<&[u8]>) -> Result<PathBuf, ReportError> {
    let bytes = self.render_pdf(logo)?;
    let path = dir.join(self.file_name());
    std::fs::write(&path, bytes).map_err(|source| ReportError::Write {
      path: path.clone(),
      source,
    })?;
    tracing::info!(path = %path.display(), rows = self.rows.len(), "Report written");
    Ok(path)
  }
}

/// Assets that have at least one repair, sorted by code.
pub fn assets_with_repairs(vehicles: &[Vehicle], machines: &[Machine], repairs: &[Repair]) -> Vec<Asset> {
  let mut assets: Vec<Asset> = vehicles
    .iter()
    .cloned()
    .map(Asset::Vehicle)
    .chain(machines.iter().cloned().map(Asset::Machine))
    .filter(|asset| {
      let asset_ref = asset.asset_ref();
      repairs.iter().any(|r| r.asset_ref == asset_ref)
    })
    .collect();
  assets.sort_by(|a, b| a.code().cmp(b.code()));
  assets
}

/// Logo for the report header: the configured URL, else the `logo_url`
/// system setting. Any failure yields a report without logo.
pub async fn load_logo(workshop: &WorkshopClient, config: &Config) -> Option<Vec<u8>> {
  let url = match &config.report.logo_url {
    Some(url) => url.clone(),
    None => match workshop.setting("logo_url").await {
      Ok(Some(url)) if !url.trim().is_empty() => url,
      Ok(_) => {
        tracing::debug!("No logo configured");
        return None;
      }
      Err(e) => {
        tracing::warn!("Could not read logo setting: {}", e);
        return None;
      }
    },
  };
  fetch_logo(workshop.backend().http(), &url).await
}

/// Download the logo. Any failure is logged and yields no logo.
pub async fn fetch_logo(http: &reqwest::Client, url: &str) -> Option<Vec<u8>> {
  let result = async {
    let response = http.get(url).send().await?.error_for_status()?;
    response.bytes().await
  }
  .await;

  match result {
    Ok(bytes) => Some(bytes.to_vec()),
    Err(e) => {
      tracing::warn!("Could not load report logo: {}", e);
      None
    }
  }
}

/// Distance from the top edge to PDF coordinates
fn y(from_top: f32) -> Mm {
  Mm(PAGE_H - from_top)
}

fn set_fill(layer: &PdfLayerReference, (r, g, b): (f32, f32, f32)) {
  layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
}

fn draw_logo(layer: &PdfLayerReference, bytes: &[u8]) {
  let decoded = match image::load_from_memory(bytes) {
    Ok(img) => img,
    Err(e) => {
      tracing::warn!("Logo is not a readable image: {}", e);
      return;
    }
  };

  let (w, h) = (decoded.width() as f32, decoded.height() as f32);
  if w == 0.0 {
    return;
  }
  let height_mm = h * LOGO_W / w;
  // dpi that makes the image LOGO_W millimetres wide
  let dpi = w * 25.4 / LOGO_W;

  Image::from_dynamic_image(&decoded).add_to_layer(
    layer.clone(),
    ImageTransform {
      translate_x: Some(Mm(MARGIN)),
      translate_y: Some(y(10.0 + height_mm)),
      dpi: Some(dpi),
      ..Default::default()
    },
  );
}

struct Table<'a> {
  doc: &'a PdfDocumentReference,
  layer: PdfLayerReference,
  /// Distance of the next row from the top edge
  top: f32,
  regular: IndirectFontRef,
  bold: IndirectFontRef,
}

impl Table<'_> {
  fn header(&mut self) {
    let height = LINE_H + 2.0 * PAD;
    self.fill_row(height, HEADER_FILL);
    set_fill(&self.layer, (1.0, 1.0, 1.0));

    let mut x = MARGIN;
    for (title, width) in COLUMNS {
      self.layer.use_text(
        title,
        FONT_SIZE,
        Mm(x + PAD),
        y(self.top + PAD + FONT_SIZE * PT_TO_MM),
        &self.bold,
      );
      x += width;
    }
    self.top += height;
  }

  fn row(&mut self, row: &ReportRow, shaded: bool) {
    let cells: Vec<Vec<String>> = row
      .cells()
      .iter()
      .zip(COLUMNS)
      .map(|(text, (_, width))| wrap(&pdf_text(text), max_chars(width)))
      .collect();
    let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let height = lines as f32 * LINE_H + 2.0 * PAD;

    if self.top + height > PAGE_H - MARGIN {
      self.new_page();
    }
    if shaded {
      self.fill_row(height, ALT_ROW_FILL);
    }

    set_fill(&self.layer, (0.0, 0.0, 0.0));
    let mut x = MARGIN;
    for (cell, (_, width)) in cells.iter().zip(COLUMNS) {
      for (i, line) in cell.iter().enumerate() {
        self.layer.use_text(
          line.as_str(),
          FONT_SIZE,
          Mm(x + PAD),
          y(self.top + PAD + FONT_SIZE * PT_TO_MM + i as f32 * LINE_H),
          &self.regular,
        );
      }
      x += width;
    }
    self.top += height;
  }

  fn fill_row(&self, height: f32, color: (f32, f32, f32)) {
    set_fill(&self.layer, color);
    self.layer.add_rect(Rect::new(
      Mm(MARGIN),
      y(self.top + height),
      Mm(PAGE_W - MARGIN),
      y(self.top),
    ));
  }

  fn new_page(&mut self) {
    let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    self.layer = self.doc.get_page(page).get_layer(layer);
    self.top = MARGIN;
    self.header();
  }
}

/// Approximate characters per line for a column at the table font size
fn max_chars(width: f32) -> usize {
  ((width - 2.0 * PAD) / (FONT_SIZE * PT_TO_MM * 0.5)) as usize
}

/// Greedy word wrap; words longer than a line are split.
fn wrap(text: &str, max: usize) -> Vec<String> {
  let max = max.max(1);
  let mut lines = Vec::new();
  let mut current = String::new();

  for word in text.split_whitespace() {
    let mut word: Vec<char> = word.chars().collect();
    while word.len() > max {
      if !current.is_empty() {
        lines.push(std::mem::take(&mut current));
      }
      lines.push(word.drain(..max).collect());
    }
    let word: String = word.into_iter().collect();
    if word.is_empty() {
      continue;
    }

    let needed = if current.is_empty() {
      word.chars().count()
    } else {
      current.chars().count() + 1 + word.chars().count()
    };
    if needed > max && !current.is_empty() {
      lines.push(std::mem::take(&mut current));
    }
    if !current.is_empty() {
      current.push(' ');
    }
    current.push_str(&word);
  }
  if !current.is_empty() || lines.is_empty() {
    lines.push(current);
  }
  lines
}

/// The built-in PDF fonts only cover ASCII reliably; fold accents and
/// replace anything else.
fn pdf_text(text: &str) -> String {
  text
    .chars()
    .map(|c| match c {
      'á' | 'à' | 'ä' | 'â' => 'a',
      'é' | 'è' | 'ë' | 'ê' => 'e',
      'í' | 'ì' | 'ï' | 'î' => 'i',
      'ó' | 'ò' | 'ö' | 'ô' => 'o',
      'ú' | 'ù' | 'ü' | 'û' => 'u',
      'Á' | 'À' | 'Ä' | 'Â' => 'A',
      'É' | 'È' | 'Ë' | 'Ê' => 'E',
      'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
      'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
      'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
      'ñ' => 'n',
      'Ñ' => 'N',
      c if c.is_ascii() && !c.is_ascii_control() => c,
      '\n' | '\t' => ' ',
      _ => '?',
    })
    .collect()
}
