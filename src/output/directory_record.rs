// 该文件是 rknn-yolo-post 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::LabelTable,
  frame::RgbNhwcFrame,
  model::{DetectionReport, DetectionSet},
  output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的记录格式: {0}")]
  UnknownFormat(String),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
  #[default]
  Text,
  Json,
}

impl RecordFormat {
  fn parse(value: &str) -> Result<Self, DirectoryRecordOutputError> {
    match value {
      "txt" | "text" => Ok(RecordFormat::Text),
      "json" => Ok(RecordFormat::Json),
      other => Err(DirectoryRecordOutputError::UnknownFormat(other.to_string())),
    }
  }

  fn extension(self) -> &'static str {
    match self {
      RecordFormat::Text => "txt",
      RecordFormat::Json => "json",
    }
  }
}

#[derive(Serialize)]
struct Record<'a> {
  image_width: u32,
  image_height: u32,
  detections: &'a [DetectionReport],
}

/// 按日期分目录保存每帧的检测结果:
/// `<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.{txt,json}`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  format: RecordFormat,
  labels: LabelTable,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut format = RecordFormat::default();
    for (k, v) in uri.query_pairs() {
      if k == "record" {
        format = RecordFormat::parse(&v)?;
        break;
      }
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(uri.path(), format).always(always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, format: RecordFormat) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      format,
      labels: LabelTable::coco(),
      frame_counter: AtomicU16::new(0),
      always: false,
    }
  }

  /// 为真时没有检测结果的帧也会留下记录
  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn with_labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.{}",
      now.format("%H-%M-%S"),
      self.frame_id(),
      self.format.extension()
    )))
  }

  fn write_record(
    &self,
    path: &Path,
    image_size: (u32, u32),
    result: &DetectionSet,
  ) -> Result<(), DirectoryRecordOutputError> {
    let reports = result.reports(&self.labels);
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    match self.format {
      RecordFormat::Text => {
        for report in &reports {
          writeln!(file, "{}", report)?;
        }
      }
      RecordFormat::Json => {
        let record = Record {
          image_width: image_size.0,
          image_height: image_size.1,
          detections: &reports,
        };
        serde_json::to_writer_pretty(&mut file, &record)?;
      }
    }
    file.flush()?;
    Ok(())
  }
}

impl<const W: u32, const H: u32> Render<RgbNhwcFrame<W, H>, DetectionSet>
  for DirectoryRecordOutput
{
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame<W, H>,
    result: &DetectionSet,
  ) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path()?;
    debug!("保存检测记录: {}", path.display());
    self.write_record(&path, frame.source_size(), result)
  }
}
