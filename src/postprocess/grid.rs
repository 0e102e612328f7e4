// 该文件是 rknn-yolo-post 项目的一部分。
// src/postprocess/grid.rs - 单尺度锚框网格解码
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

use tracing::{debug, error};

use crate::{
  config::BoxCoding,
  postprocess::{Candidate, CenterBox, DecodeError},
  quant::{Activation, ActivationTable},
  tensor::RawTensor,
};

// [tx, ty, tw, th, objectness, class_0, ...]
const BOX_CHANNELS: usize = 4;
const OBJECTNESS: usize = 4;
const CLASS_OFFSET: usize = 5;

#[derive(Debug, Clone)]
pub struct GridParams<'a> {
  pub scale_index: usize,
  pub stride: f32,
  pub anchors: &'a [(f32, f32)],
  pub num_classes: usize,
  pub conf_threshold: f32,
  pub box_coding: BoxCoding,
  pub activation: Activation,
}

fn shape_mismatch(
  scale: usize,
  field: &'static str,
  expected: usize,
  actual: usize,
) -> DecodeError {
  error!(
    "检测头 {}: 张量形状不匹配 - {} 期望 {}, 实际 {}",
    scale, field, expected, actual
  );
  DecodeError::ShapeMismatch {
    scale,
    field,
    expected,
    actual,
  }
}

fn check_tensor(tensor: &RawTensor<'_>, params: &GridParams<'_>) -> Result<(), DecodeError> {
  let scale = params.scale_index;
  let shape = tensor.shape();

  let channels = CLASS_OFFSET + params.num_classes;
  if shape.channels != channels {
    return Err(shape_mismatch(scale, "channels", channels, shape.channels));
  }
  if shape.anchors != params.anchors.len() {
    return Err(shape_mismatch(
      scale,
      "anchors",
      params.anchors.len(),
      shape.anchors,
    ));
  }

  let Some(expected) = shape.num_elements() else {
    return Err(shape_mismatch(scale, "elements", usize::MAX, tensor.len()));
  };
  if expected == 0 || tensor.len() != expected {
    return Err(shape_mismatch(scale, "elements", expected, tensor.len()));
  }

  if !tensor.quant().is_valid() {
    error!("检测头 {}: 量化参数无效 {:?}", scale, tensor.quant());
    return Err(DecodeError::InvalidQuantParam {
      scale,
      param: tensor.quant(),
    });
  }

  Ok(())
}

/// 按 i8 比较找出最大类别，scale 为正时反量化与激活都单调，
/// 因此原始字节的最大值就是概率的最大值。并列时取较小的类别。
#[inline]
fn argmax_raw(classes: &[u8]) -> Option<(usize, u8)> {
  let (&first, rest) = classes.split_first()?;
  let mut best_idx = 0;
  let mut best = first as i8;
  for (idx, &byte) in rest.iter().enumerate() {
    if (byte as i8) > best {
      best = byte as i8;
      best_idx = idx + 1;
    }
  }
  Some((best_idx, best as u8))
}

/// 解码单个输出张量为候选框列表
pub fn decode_grid(
  tensor: RawTensor<'_>,
  params: &GridParams<'_>,
) -> Result<Vec<Candidate>, DecodeError> {
  check_tensor(&tensor, params)?;

  let shape = tensor.shape();
  let data = tensor.data();
  let table = ActivationTable::new(tensor.quant(), params.activation);
  let threshold = params.conf_threshold;
  let stride = params.stride;

  debug!(
    "检测头 {}: 网格 {}x{}, 锚框 {}, 步长 {}, 量化参数 {:?}",
    params.scale_index,
    shape.grid_h,
    shape.grid_w,
    shape.anchors,
    stride,
    tensor.quant()
  );

  let mut candidates = Vec::new();
  let mut base = 0usize;

  for row in 0..shape.grid_h {
    for col in 0..shape.grid_w {
      for &(anchor_w, anchor_h) in params.anchors {
        let cell = &data[base..base + shape.channels];
        base += shape.channels;

        let objectness = table.activated(cell[OBJECTNESS]);
        if objectness < threshold {
          continue;
        }

        let Some((class_id, class_raw)) = argmax_raw(&cell[CLASS_OFFSET..]) else {
          continue;
        };
        let class_score = table.activated(class_raw);
        let score = objectness * class_score;
        if score < threshold {
          continue;
        }

        let geometry = &cell[..BOX_CHANNELS];
        let bbox = match params.box_coding {
          BoxCoding::YoloV5 => {
            let tx = table.activated(geometry[0]) * 2.0 - 0.5;
            let ty = table.activated(geometry[1]) * 2.0 - 0.5;
            let tw = table.activated(geometry[2]) * 2.0;
            let th = table.activated(geometry[3]) * 2.0;
            CenterBox::new(
              (tx + col as f32) * stride,
              (ty + row as f32) * stride,
              tw * tw * anchor_w,
              th * th * anchor_h,
            )
          }
          BoxCoding::YoloV3 => CenterBox::new(
            (table.activated(geometry[0]) + col as f32) * stride,
            (table.activated(geometry[1]) + row as f32) * stride,
            table.dequantized(geometry[2]).exp() * anchor_w,
            table.dequantized(geometry[3]).exp() * anchor_h,
          ),
        };

        candidates.push(Candidate {
          bbox,
          objectness,
          class_id: class_id as u32,
          class_score,
          score,
        });
      }
    }
  }

  debug!(
    "检测头 {}: 候选框数量 {}",
    params.scale_index,
    candidates.len()
  );
  Ok(candidates)
}
