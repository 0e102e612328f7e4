// 该文件是 rknn-yolo-post 项目的一部分。
// src/quant.rs - 量化编解码
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

use serde::{Deserialize, Serialize};

/// 单个输出张量的仿射量化参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
  pub scale: f32,
  pub zero_point: i32,
}

impl QuantParam {
  pub fn new(scale: f32, zero_point: i32) -> Self {
    Self { scale, zero_point }
  }

  /// scale 必须为有限正数
  pub fn is_valid(&self) -> bool {
    self.scale.is_finite() && self.scale > 0.0
  }
}

/// 反量化: (raw - zp) * scale
#[inline]
pub fn dequantize(raw: i8, p: QuantParam) -> f32 {
  (raw as i32 - p.zero_point) as f32 * p.scale
}

/// 量化: round(x / scale + zp)，饱和到 i8 范围
#[inline]
pub fn quantize(x: f32, p: QuantParam) -> i8 {
  let q = (x / p.scale + p.zero_point as f32).round();
  q.clamp(i8::MIN as f32, i8::MAX as f32) as i8
}

/// 数值稳定的 sigmoid，按符号分支避免 exp 溢出
#[inline]
pub fn sigmoid(x: f32) -> f32 {
  if x >= 0.0 {
    1.0 / (1.0 + (-x).exp())
  } else {
    let e = x.exp();
    e / (1.0 + e)
  }
}

/// 输出通道的概率变换方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
  /// 输出为 logit，需要 sigmoid
  #[default]
  Sigmoid,
  /// 模型内已融合 sigmoid，直接使用反量化结果
  Identity,
}

impl Activation {
  #[inline]
  pub fn apply(self, x: f32) -> f32 {
    match self {
      Activation::Sigmoid => sigmoid(x),
      Activation::Identity => x,
    }
  }
}

/// 按原始字节索引的查找表。
///
/// 每个张量只有 256 种可能的取值，解码前一次性算好反量化值与激活值，
/// 网格遍历的热循环中只做查表。
#[derive(Clone)]
pub struct ActivationTable {
  dequantized: [f32; 256],
  activated: [f32; 256],
}

impl ActivationTable {
  pub fn new(p: QuantParam, activation: Activation) -> Self {
    let mut dequantized = [0.0f32; 256];
    let mut activated = [0.0f32; 256];
    for byte in 0..=u8::MAX {
      let value = dequantize(byte as i8, p);
      dequantized[byte as usize] = value;
      activated[byte as usize] = activation.apply(value);
    }
    Self {
      dequantized,
      activated,
    }
  }

  #[inline(always)]
  pub fn dequantized(&self, byte: u8) -> f32 {
    self.dequantized[byte as usize]
  }

  #[inline(always)]
  pub fn activated(&self, byte: u8) -> f32 {
    self.activated[byte as usize]
  }
}

impl std::fmt::Debug for ActivationTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActivationTable")
      .field("min", &self.dequantized[128])
      .field("max", &self.dequantized[127])
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dequantize_matches_affine_formula() {
    let p = QuantParam::new(0.5, -3);
    assert_eq!(dequantize(-3, p), 0.0);
    assert_eq!(dequantize(1, p), 2.0);
    assert_eq!(dequantize(-128, p), -62.5);
  }

  #[test]
  fn quantize_saturates() {
    let p = QuantParam::new(0.1, 0);
    assert_eq!(quantize(1000.0, p), i8::MAX);
    assert_eq!(quantize(-1000.0, p), i8::MIN);
  }

  #[test]
  fn round_trip_within_one_step() {
    let p = QuantParam::new(0.0372, -17);
    let lo = dequantize(i8::MIN, p);
    let hi = dequantize(i8::MAX, p);
    let steps = 1000;
    for i in 0..=steps {
      let x = lo + (hi - lo) * i as f32 / steps as f32;
      let back = dequantize(quantize(x, p), p);
      assert!((back - x).abs() <= p.scale, "x={x} back={back}");
    }
  }

  #[test]
  fn sigmoid_is_stable_at_extremes() {
    assert_eq!(sigmoid(0.0), 0.5);
    let big = sigmoid(1000.0);
    let small = sigmoid(-1000.0);
    assert!(big.is_finite() && (big - 1.0).abs() < 1e-6);
    assert!(small.is_finite() && small >= 0.0 && small < 1e-6);
    assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn table_indexes_by_raw_byte() {
    let p = QuantParam::new(0.25, 10);
    let table = ActivationTable::new(p, Activation::Sigmoid);
    let raw: i8 = -5;
    assert_eq!(table.dequantized(raw as u8), dequantize(raw, p));
    assert_eq!(table.activated(raw as u8), sigmoid(dequantize(raw, p)));

    let identity = ActivationTable::new(p, Activation::Identity);
    assert_eq!(identity.activated(raw as u8), dequantize(raw, p));
  }

  #[test]
  fn validity_rejects_non_positive_scale() {
    assert!(QuantParam::new(0.1, 0).is_valid());
    assert!(!QuantParam::new(0.0, 0).is_valid());
    assert!(!QuantParam::new(-1.0, 0).is_valid());
    assert!(!QuantParam::new(f32::NAN, 0).is_valid());
  }
}
