// 该文件是 rknn-yolo-post 项目的一部分。
// src/config.rs - 后处理配置
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::quant::Activation;

pub const DEFAULT_BOX_THRESH: f32 = 0.25;
pub const DEFAULT_NMS_THRESH: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 64;

/// YOLOv5 COCO 默认锚框, 每个尺度 3 个 (w, h)
pub const YOLOV5_ANCHORS: [[(f32, f32); 3]; 3] = [
  [(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
  [(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)],
  [(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)],
];
pub const YOLOV5_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("{name} 阈值必须在 [0, 1] 内, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("锚框表为空")]
  EmptyAnchorTable,
  #[error("第 {scale} 个尺度没有锚框")]
  EmptyScale { scale: usize },
  #[error("第 {scale} 个尺度的锚框尺寸无效: ({w}, {h})")]
  InvalidAnchor { scale: usize, w: f32, h: f32 },
  #[error("第 {scale} 个尺度的步长无效: {stride}")]
  InvalidStride { scale: usize, stride: f32 },
  #[error("类别标签表为空")]
  EmptyLabels,
  #[error("最大检测数量必须大于 0")]
  ZeroMaxDetections,
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidModelSize { width: u32, height: u32 },
  #[error("读取标签文件失败: {path}: {source}")]
  LabelFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 框回归参数化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxCoding {
  /// cx = (2σ - 0.5 + col) * stride, w = (2σ)^2 * anchor
  #[default]
  YoloV5,
  /// cx = (σ + col) * stride, w = e^t * anchor，宽高通道需为未激活的 logit
  YoloV3,
}

/// 单个检测尺度: 步长与该尺度的锚框
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpec {
  pub stride: f32,
  pub anchors: Box<[(f32, f32)]>,
}

impl ScaleSpec {
  pub fn new(stride: f32, anchors: &[(f32, f32)]) -> Self {
    Self {
      stride,
      anchors: anchors.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  pub fn coco() -> Self {
    Self::from_iter(COCO_CLASSES)
  }

  /// 每行一个标签，忽略空行
  pub fn parse(text: &str) -> Self {
    Self::from_iter(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
    )
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::LabelFile {
        path: path.to_path_buf(),
        source,
      })?;
    let table = Self::parse(&text);
    debug!("标签数量: {}", table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.labels.get(class_id as usize).map(String::as_str)
  }

  pub fn index_of(&self, label: &str) -> Option<u32> {
    self.labels.iter().position(|l| l == label).map(|i| i as u32)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

/// 后处理配置。
///
/// 通过 `DecodeConfig::builder()` 构建，`build` 时完成校验，
/// 之后所有解码运行共享同一份只读配置。
#[derive(Debug, Clone)]
pub struct DecodeConfig {
  model_width: u32,
  model_height: u32,
  conf_threshold: f32,
  nms_threshold: f32,
  max_detections: usize,
  scales: Box<[ScaleSpec]>,
  box_coding: BoxCoding,
  activation: Activation,
  labels: LabelTable,
}

impl DecodeConfig {
  pub fn builder() -> DecodeConfigBuilder {
    DecodeConfigBuilder::default()
  }

  pub fn model_size(&self) -> (u32, u32) {
    (self.model_width, self.model_height)
  }

  pub fn conf_threshold(&self) -> f32 {
    self.conf_threshold
  }

  pub fn nms_threshold(&self) -> f32 {
    self.nms_threshold
  }

  pub fn max_detections(&self) -> usize {
    self.max_detections
  }

  pub fn scales(&self) -> &[ScaleSpec] {
    &self.scales
  }

  pub fn box_coding(&self) -> BoxCoding {
    self.box_coding
  }

  pub fn activation(&self) -> Activation {
    self.activation
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn num_classes(&self) -> usize {
    self.labels.len()
  }
}

#[derive(Debug, Clone)]
pub struct DecodeConfigBuilder {
  model_width: u32,
  model_height: u32,
  conf_threshold: f32,
  nms_threshold: f32,
  max_detections: usize,
  scales: Vec<ScaleSpec>,
  box_coding: BoxCoding,
  activation: Activation,
  labels: LabelTable,
}

impl Default for DecodeConfigBuilder {
  fn default() -> Self {
    Self {
      model_width: 640,
      model_height: 640,
      conf_threshold: DEFAULT_BOX_THRESH,
      nms_threshold: DEFAULT_NMS_THRESH,
      max_detections: DEFAULT_MAX_DETECTIONS,
      scales: YOLOV5_STRIDES
        .iter()
        .zip(YOLOV5_ANCHORS.iter())
        .map(|(&stride, anchors)| ScaleSpec::new(stride, anchors))
        .collect(),
      box_coding: BoxCoding::default(),
      activation: Activation::default(),
      labels: LabelTable::coco(),
    }
  }
}

impl DecodeConfigBuilder {
  pub fn model_size(mut self, width: u32, height: u32) -> Self {
    self.model_width = width;
    self.model_height = height;
    self
  }

  pub fn conf_threshold(mut self, threshold: f32) -> Self {
    self.conf_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn max_detections(mut self, max: usize) -> Self {
    self.max_detections = max;
    self
  }

  pub fn scales(mut self, scales: Vec<ScaleSpec>) -> Self {
    self.scales = scales;
    self
  }

  pub fn box_coding(mut self, coding: BoxCoding) -> Self {
    self.box_coding = coding;
    self
  }

  pub fn activation(mut self, activation: Activation) -> Self {
    self.activation = activation;
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  pub fn build(self) -> Result<DecodeConfig, ConfigError> {
    check_threshold("置信度", self.conf_threshold)?;
    check_threshold("NMS", self.nms_threshold)?;

    if self.model_width == 0 || self.model_height == 0 {
      return Err(ConfigError::InvalidModelSize {
        width: self.model_width,
        height: self.model_height,
      });
    }
    if self.scales.is_empty() {
      return Err(ConfigError::EmptyAnchorTable);
    }
    for (scale, spec) in self.scales.iter().enumerate() {
      if !(spec.stride.is_finite() && spec.stride > 0.0) {
        return Err(ConfigError::InvalidStride {
          scale,
          stride: spec.stride,
        });
      }
      if spec.anchors.is_empty() {
        return Err(ConfigError::EmptyScale { scale });
      }
      if let Some(&(w, h)) = spec
        .anchors
        .iter()
        .find(|(w, h)| !(w.is_finite() && *w > 0.0 && h.is_finite() && *h > 0.0))
      {
        return Err(ConfigError::InvalidAnchor { scale, w, h });
      }
    }
    if self.labels.is_empty() {
      return Err(ConfigError::EmptyLabels);
    }
    if self.max_detections == 0 {
      return Err(ConfigError::ZeroMaxDetections);
    }

    debug!(
      "后处理配置: 输入 {}x{}, 置信度 {}, NMS {}, 尺度数 {}, 类别数 {}",
      self.model_width,
      self.model_height,
      self.conf_threshold,
      self.nms_threshold,
      self.scales.len(),
      self.labels.len()
    );

    Ok(DecodeConfig {
      model_width: self.model_width,
      model_height: self.model_height,
      conf_threshold: self.conf_threshold,
      nms_threshold: self.nms_threshold,
      max_detections: self.max_detections,
      scales: self.scales.into_boxed_slice(),
      box_coding: self.box_coding,
      activation: self.activation,
      labels: self.labels,
    })
  }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
  // NaN 也会落入这里
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_yolov5_demo() {
    let config = DecodeConfig::builder().build().unwrap();
    assert_eq!(config.model_size(), (640, 640));
    assert_eq!(config.conf_threshold(), 0.25);
    assert_eq!(config.nms_threshold(), 0.45);
    assert_eq!(config.max_detections(), 64);
    assert_eq!(config.num_classes(), 80);
    assert_eq!(config.scales().len(), 3);
    assert_eq!(config.scales()[2].stride, 32.0);
    assert_eq!(config.scales()[2].anchors[2], (373.0, 326.0));
    assert_eq!(config.labels().get(0), Some("person"));
  }

  #[test]
  fn rejects_out_of_range_thresholds() {
    let err = DecodeConfig::builder().conf_threshold(1.5).build().unwrap_err();
    assert!(matches!(err, ConfigError::ThresholdOutOfRange { .. }));

    let err = DecodeConfig::builder().nms_threshold(-0.1).build().unwrap_err();
    assert!(matches!(err, ConfigError::ThresholdOutOfRange { .. }));

    let err = DecodeConfig::builder()
      .conf_threshold(f32::NAN)
      .build()
      .unwrap_err();
    assert!(matches!(err, ConfigError::ThresholdOutOfRange { .. }));
  }

  #[test]
  fn boundary_thresholds_are_accepted() {
    assert!(DecodeConfig::builder().conf_threshold(0.0).build().is_ok());
    assert!(DecodeConfig::builder().nms_threshold(1.0).build().is_ok());
  }

  #[test]
  fn rejects_empty_anchor_table() {
    let err = DecodeConfig::builder().scales(Vec::new()).build().unwrap_err();
    assert!(matches!(err, ConfigError::EmptyAnchorTable));

    let err = DecodeConfig::builder()
      .scales(vec![ScaleSpec::new(8.0, &[])])
      .build()
      .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyScale { scale: 0 }));
  }

  #[test]
  fn rejects_bad_anchor_and_stride() {
    let err = DecodeConfig::builder()
      .scales(vec![ScaleSpec::new(8.0, &[(10.0, 0.0)])])
      .build()
      .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAnchor { scale: 0, .. }));

    let err = DecodeConfig::builder()
      .scales(vec![ScaleSpec::new(0.0, &[(10.0, 10.0)])])
      .build()
      .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStride { scale: 0, .. }));
  }

  #[test]
  fn rejects_empty_labels_and_zero_cap() {
    let err = DecodeConfig::builder()
      .labels(LabelTable::parse("\n\n"))
      .build()
      .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyLabels));

    let err = DecodeConfig::builder().max_detections(0).build().unwrap_err();
    assert!(matches!(err, ConfigError::ZeroMaxDetections));
  }

  #[test]
  fn label_table_parses_lines() {
    let labels = LabelTable::parse("person\n  car \n\nbus\n");
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(1), Some("car"));
    assert_eq!(labels.index_of("bus"), Some(2));
    assert_eq!(labels.get(3), None);
  }

  #[test]
  fn missing_label_file_keeps_io_source() {
    use std::error::Error;

    let path = std::env::temp_dir().join(format!(
      "rknn-yolo-post-missing-labels-{}.txt",
      std::process::id()
    ));
    let err = LabelTable::from_file(&path).unwrap_err();
    match &err {
      ConfigError::LabelFile { path: reported, source } => {
        assert_eq!(reported, &path);
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(err.source().is_some());
  }

  #[test]
  fn label_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
      "rknn-yolo-post-labels-{}.txt",
      std::process::id()
    ));
    std::fs::write(&path, "cat
dog
").unwrap();
    let labels = LabelTable::from_file(&path).unwrap();
    assert_eq!(labels.index_of("dog"), Some(1));
    std::fs::remove_file(&path).unwrap();
  }
}
