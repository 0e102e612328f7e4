// 该文件是 rknn-yolo-post 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::config::LabelTable;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub confidence: f32,
  pub bbox: [f32; 4], // [left, top, right, bottom]，原图像素坐标
}

/// 最终检测结果，按置信度降序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
  pub items: Box<[Detection]>,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn reports(&self, labels: &LabelTable) -> Vec<DetectionReport> {
    self
      .items
      .iter()
      .map(|item| DetectionReport::new(item, labels))
      .collect()
  }
}

impl From<Vec<Detection>> for DetectionSet {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 面向输出的检测结果，置信度为百分比
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
  pub label: String,
  pub confidence: f32,
  pub left: i32,
  pub top: i32,
  pub right: i32,
  pub bottom: i32,
}

impl DetectionReport {
  pub fn new(item: &Detection, labels: &LabelTable) -> Self {
    let [left, top, right, bottom] = item.bbox;
    Self {
      label: labels.get(item.class_id).unwrap_or("unknown").to_string(),
      confidence: item.confidence * 100.0,
      left: left as i32,
      top: top as i32,
      right: right as i32,
      bottom: bottom as i32,
    }
  }
}

impl std::fmt::Display for DetectionReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} @ ({} {} {} {}) {:.1}%",
      self.label, self.left, self.top, self.right, self.bottom, self.confidence
    )
  }
}

mod yolov5;
pub use self::yolov5::{Yolov5, Yolov5Builder, Yolov5Error};
