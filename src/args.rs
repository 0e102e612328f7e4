// 该文件是 rknn-yolo-post 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use rknn_yolo_post::config::{
  BoxCoding, DEFAULT_BOX_THRESH, DEFAULT_MAX_DETECTIONS, DEFAULT_NMS_THRESH,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxCodingArg {
  V5,
  V3,
}

impl From<BoxCodingArg> for BoxCoding {
  fn from(value: BoxCodingArg) -> Self {
    match value {
      BoxCodingArg::V5 => BoxCoding::YoloV5,
      BoxCodingArg::V3 => BoxCoding::YoloV3,
    }
  }
}

/// rknn-yolo-post 参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出来源，例如 replay:///path/to/dump
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源，例如 image:///path/to/bus.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径: console: 或 folder:///path?record=json|txt
  #[arg(long, value_name = "OUTPUT", default_value = "console:")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_BOX_THRESH, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NMS_THRESH, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 最多输出的检测数量
  #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS, value_name = "COUNT")]
  pub max_detections: usize,

  /// 检测框编码方式
  #[arg(long, value_enum, default_value_t = BoxCodingArg::V5)]
  pub box_coding: BoxCodingArg,

  /// 模型输出已经过 sigmoid
  #[arg(long)]
  pub activated_outputs: bool,

  /// 标签文件，每行一个标签；缺省为 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 重复推理次数，大于 1 时输出平均耗时
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub loop_count: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_demo_constants() {
    let args = Args::parse_from([
      "rknn-yolo-post",
      "--model",
      "replay:///tmp/dump",
      "--input",
      "image:///tmp/bus.jpg",
    ]);
    assert_eq!(args.output.scheme(), "console");
    assert_eq!(args.confidence, 0.25);
    assert_eq!(args.nms_threshold, 0.45);
    assert_eq!(args.max_detections, 64);
    assert_eq!(args.box_coding, BoxCodingArg::V5);
    assert!(!args.activated_outputs);
    assert_eq!(args.loop_count, 1);
  }

  #[test]
  fn parses_overrides() {
    let args = Args::parse_from([
      "rknn-yolo-post",
      "--model",
      "replay:///tmp/dump",
      "--input",
      "image:///tmp/bus.jpg",
      "--output",
      "folder:///tmp/out?record=json",
      "--box-coding",
      "v3",
      "--activated-outputs",
      "--loop-count",
      "20",
    ]);
    assert_eq!(args.output.scheme(), "folder");
    assert_eq!(BoxCoding::from(args.box_coding), BoxCoding::YoloV3);
    assert!(args.activated_outputs);
    assert_eq!(args.loop_count, 20);
  }
}
