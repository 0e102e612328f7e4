// 该文件是 rknn-yolo-post 项目的一部分。
// src/output/console.rs - 控制台输出
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

use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::LabelTable,
  frame::RgbNhwcFrame,
  model::DetectionSet,
  output::Render,
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 逐行打印检测结果: `label @ (left top right bottom) confidence%`
pub struct ConsoleOutput {
  labels: LabelTable,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }
    Ok(Self::default())
  }
}

impl Default for ConsoleOutput {
  fn default() -> Self {
    Self {
      labels: LabelTable::coco(),
    }
  }
}

impl ConsoleOutput {
  pub fn with_labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  pub fn write_result<Wr: Write>(
    &self,
    writer: &mut Wr,
    result: &DetectionSet,
  ) -> Result<(), ConsoleOutputError> {
    for report in result.reports(&self.labels) {
      writeln!(writer, "{}", report)?;
    }
    Ok(())
  }
}

impl<const W: u32, const H: u32> Render<RgbNhwcFrame<W, H>, DetectionSet> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(
    &self,
    _frame: &RgbNhwcFrame<W, H>,
    result: &DetectionSet,
  ) -> Result<(), Self::Error> {
    info!("检测到 {} 个物体", result.len());
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    self.write_result(&mut lock, result)?;
    lock.flush()?;
    Ok(())
  }
}
