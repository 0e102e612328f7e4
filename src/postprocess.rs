// 该文件是 rknn-yolo-post 项目的一部分。
// src/postprocess.rs - 输出解码与非极大值抑制
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

use thiserror::Error;
use tracing::debug;

use crate::{
  config::DecodeConfig,
  model::{Detection, DetectionSet},
  quant::QuantParam,
  tensor::RawTensor,
};

mod aggregate;
mod grid;
mod mapper;
mod nms;

pub use self::aggregate::{CandidateSet, aggregate};
pub use self::grid::{GridParams, decode_grid};
pub use self::mapper::CoordinateMapper;
pub use self::nms::{iou, suppress};

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("第 {scale} 个尺度的张量形状不匹配: {field} 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    scale: usize,
    field: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("第 {scale} 个尺度的量化参数无效: {param:?}")]
  InvalidQuantParam { scale: usize, param: QuantParam },
  #[error("输出张量数量不匹配: 期望 {expected}, 实际 {actual}")]
  OutputCountMismatch { expected: usize, actual: usize },
}

/// 模型输入像素坐标下的中心点框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterBox {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

impl CenterBox {
  pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }

  /// [left, top, right, bottom]
  pub fn to_ltrb(&self) -> [f32; 4] {
    let half_w = self.w / 2.0;
    let half_h = self.h / 2.0;
    [
      self.cx - half_w,
      self.cy - half_h,
      self.cx + half_w,
      self.cy + half_h,
    ]
  }

  pub fn area(&self) -> f32 {
    self.w * self.h
  }
}

/// 网格解码得到的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: CenterBox,
  pub objectness: f32,
  pub class_id: u32,
  pub class_score: f32,
  /// objectness * class_score
  pub score: f32,
}

/// 完整的后处理流水线: 网格解码 -> 汇总 -> NMS -> 坐标映射
#[derive(Debug, Clone)]
pub struct PostProcessor {
  config: DecodeConfig,
}

impl PostProcessor {
  pub fn new(config: DecodeConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  fn grid_params(&self, scale_index: usize) -> GridParams<'_> {
    let spec = &self.config.scales()[scale_index];
    GridParams {
      scale_index,
      stride: spec.stride,
      anchors: &spec.anchors,
      num_classes: self.config.num_classes(),
      conf_threshold: self.config.conf_threshold(),
      box_coding: self.config.box_coding(),
      activation: self.config.activation(),
    }
  }

  fn decode_each(&self, tensors: &[RawTensor<'_>]) -> Vec<Result<Vec<Candidate>, DecodeError>> {
    #[cfg(feature = "rayon")]
    {
      use rayon::prelude::*;
      tensors
        .par_iter()
        .enumerate()
        .map(|(idx, tensor)| decode_grid(*tensor, &self.grid_params(idx)))
        .collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
      tensors
        .iter()
        .enumerate()
        .map(|(idx, tensor)| decode_grid(*tensor, &self.grid_params(idx)))
        .collect()
    }
  }

  /// 解码全部尺度并按发现顺序汇总。任一尺度失败则整体失败。
  pub fn decode(&self, tensors: &[RawTensor<'_>]) -> Result<CandidateSet, DecodeError> {
    let expected = self.config.scales().len();
    if tensors.len() != expected {
      return Err(DecodeError::OutputCountMismatch {
        expected,
        actual: tensors.len(),
      });
    }

    let candidates = aggregate(self.decode_each(tensors))?;
    debug!("NMS 前候选框数量: {}", candidates.len());
    Ok(candidates)
  }

  pub fn process(
    &self,
    tensors: &[RawTensor<'_>],
    image_size: (u32, u32),
  ) -> Result<DetectionSet, DecodeError> {
    let candidates = self.decode(tensors)?;
    if candidates.is_empty() {
      debug!("没有候选框通过置信度阈值");
      return Ok(DetectionSet::default());
    }

    let kept = suppress(candidates, self.config.nms_threshold());
    debug!("NMS 后剩余: {}", kept.len());

    let mapper = CoordinateMapper::new(self.config.model_size(), image_size);
    let items: Vec<Detection> = kept
      .iter()
      .take(self.config.max_detections())
      .map(|candidate| mapper.map(candidate))
      .collect();

    Ok(DetectionSet::from(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{LabelTable, ScaleSpec},
    quant::{QuantParam, quantize},
    tensor::{OutputTensor, TensorShape},
  };

  const Q: QuantParam = QuantParam {
    scale: 0.05,
    zero_point: 0,
  };

  fn config(scales: usize) -> DecodeConfig {
    DecodeConfig::builder()
      .labels(LabelTable::parse("person\ncar"))
      .scales(
        (0..scales)
          .map(|i| ScaleSpec::new(8.0 * (1 << i) as f32, &[(16.0, 16.0)]))
          .collect(),
      )
      .build()
      .unwrap()
  }

  fn empty_tensor(grid: usize) -> OutputTensor {
    let shape = TensorShape::new(grid, grid, 1, 7);
    let data = vec![quantize(-6.0, Q); shape.num_elements().unwrap()];
    OutputTensor::from_i8(&data, shape, Q)
  }

  #[test]
  fn box_to_ltrb() {
    let b = CenterBox::new(10.0, 20.0, 4.0, 8.0);
    assert_eq!(b.to_ltrb(), [8.0, 16.0, 12.0, 24.0]);
    assert_eq!(b.area(), 32.0);
  }

  #[test]
  fn wrong_tensor_count_is_rejected() {
    let pp = PostProcessor::new(config(3));
    let t = empty_tensor(4);
    let err = pp.decode(&[t.view(), t.view()]).unwrap_err();
    assert_eq!(
      err,
      DecodeError::OutputCountMismatch {
        expected: 3,
        actual: 2
      }
    );
  }

  #[test]
  fn quiet_outputs_yield_empty_set() {
    let pp = PostProcessor::new(config(2));
    let a = empty_tensor(4);
    let b = empty_tensor(2);
    let result = pp.process(&[a.view(), b.view()], (64, 64)).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn one_bad_scale_fails_whole_run() {
    let pp = PostProcessor::new(config(2));
    let good = empty_tensor(4);
    let shape = TensorShape::new(2, 2, 1, 7);
    let bad = OutputTensor::from_i8(&vec![0i8; shape.num_elements().unwrap() - 1], shape, Q);
    let err = pp.process(&[good.view(), bad.view()], (64, 64)).unwrap_err();
    assert!(matches!(err, DecodeError::ShapeMismatch { scale: 1, .. }));
  }
}
