// 该文件是 rknn-yolo-post 项目的一部分。
// src/model/yolov5.rs - YOLOv5 检测模型
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
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  config::{ConfigError, DecodeConfig, DecodeConfigBuilder},
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{DetectionSet, Model},
  postprocess::{DecodeError, PostProcessor},
  runtime::{ReplayError, ReplayRuntime, Runtime},
  tensor::{OutputTensor, RawTensor},
};

const YOLOV5_INPUT_CHANNELS: u32 = 3;

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("回放错误: {0}")]
  Replay(#[from] ReplayError),
  #[error("运行时错误: {0}")]
  Runtime(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("后处理错误: {0}")]
  Decode(#[from] DecodeError),
}

impl Yolov5Error {
  fn invalid(msg: String) -> Self {
    error!("{}", msg);
    Yolov5Error::ModelInvalid(msg)
  }
}

pub struct Yolov5<R, const W: u32, const H: u32> {
  runtime: R,
  post: PostProcessor,
}

pub struct Yolov5Builder<R> {
  runtime: R,
  config: DecodeConfigBuilder,
}

impl FromUrl for Yolov5Builder<ReplayRuntime> {
  type Error = Yolov5Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Self::new(ReplayRuntime::from_url(url)?))
  }
}

impl<R: Runtime> Yolov5Builder<R> {
  pub fn new(runtime: R) -> Self {
    Self {
      runtime,
      config: DecodeConfig::builder(),
    }
  }

  /// 输入尺寸由 `build` 的 W/H 决定，此处设置的 model_size 会被覆盖
  pub fn config(mut self, config: DecodeConfigBuilder) -> Self {
    self.config = config;
    self
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<Yolov5<R, W, H>, Yolov5Error> {
    let config = self.config.model_size(W, H).build()?;

    let input = self.runtime.input_shape();
    debug!(
      "模型输入: {}x{}x{}",
      input.width, input.height, input.channels
    );
    if (input.width, input.height, input.channels) != (W, H, YOLOV5_INPUT_CHANNELS) {
      return Err(Yolov5Error::invalid(format!(
        "预期模型输入为 {}x{}x{}, 实际为 {}x{}x{}",
        W, H, YOLOV5_INPUT_CHANNELS, input.width, input.height, input.channels
      )));
    }

    let num_outputs = self.runtime.num_outputs();
    debug!("模型输出数量: {}", num_outputs);
    if num_outputs != config.scales().len() {
      return Err(Yolov5Error::invalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        config.scales().len(),
        num_outputs
      )));
    }

    info!("模型加载完成");
    Ok(Yolov5 {
      runtime: self.runtime,
      post: PostProcessor::new(config),
    })
  }
}

impl<R, const W: u32, const H: u32> Yolov5<R, W, H> {
  pub fn config(&self) -> &DecodeConfig {
    self.post.config()
  }
}

impl<R: Runtime, const W: u32, const H: u32> Model for Yolov5<R, W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectionSet;
  type Error = Yolov5Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("执行模型推理");
    let outputs = self
      .runtime
      .run(input.as_nhwc())
      .map_err(|e| Yolov5Error::Runtime(Box::new(e)))?;

    debug!("后处理模型输出");
    let views: Vec<RawTensor<'_>> = outputs.iter().map(OutputTensor::view).collect();
    let result = self.post.process(&views, input.source_size())?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}
