// 该文件是 rknn-yolo-post 项目的一部分。
// src/postprocess/mapper.rs - 模型坐标到原图坐标的映射
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

use crate::{model::Detection, postprocess::Candidate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  scale_w: f32,
  scale_h: f32,
  max_x: f32,
  max_y: f32,
}

impl CoordinateMapper {
  /// scale = 模型尺寸 / 原图尺寸，宽高独立
  pub fn new(model_size: (u32, u32), image_size: (u32, u32)) -> Self {
    let (model_w, model_h) = model_size;
    let image_w = image_size.0.max(1);
    let image_h = image_size.1.max(1);
    Self {
      scale_w: model_w as f32 / image_w as f32,
      scale_h: model_h as f32 / image_h as f32,
      max_x: (image_w - 1) as f32,
      max_y: (image_h - 1) as f32,
    }
  }

  pub fn scale(&self) -> (f32, f32) {
    (self.scale_w, self.scale_h)
  }

  pub fn map(&self, candidate: &Candidate) -> Detection {
    let [left, top, right, bottom] = candidate.bbox.to_ltrb();
    Detection {
      class_id: candidate.class_id,
      confidence: candidate.score,
      bbox: [
        (left / self.scale_w).clamp(0.0, self.max_x),
        (top / self.scale_h).clamp(0.0, self.max_y),
        (right / self.scale_w).clamp(0.0, self.max_x),
        (bottom / self.scale_h).clamp(0.0, self.max_y),
      ],
    }
  }
}
