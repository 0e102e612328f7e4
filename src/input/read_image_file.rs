// 该文件是 rknn-yolo-post 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图像输入，按模型输入尺寸 W x H 缩放后输出一帧
pub struct ImageFileInput<const W: u32, const H: u32> {
  image: Option<RgbImage>,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageFileInput<W, H> {
  const SCHEME: &'static str = "image";
}

impl<const W: u32, const H: u32> FromUrl for ImageFileInput<W, H> {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url.path())
  }
}

impl<const W: u32, const H: u32> ImageFileInput<W, H> {
  pub fn open(path: &str) -> Result<Self, ImageFileInputError> {
    info!("读取图像文件: {}", path);
    let image = ImageReader::open(path)?.decode()?;
    Ok(Self::from_image(image.into()))
  }

  pub fn from_image(image: RgbImage) -> Self {
    Self { image: Some(image) }
  }

  pub fn into_nhwc(self) -> ImageFileInputNhwc<W, H> {
    ImageFileInputNhwc { inner: self }
  }
}

pub struct ImageFileInputNhwc<const W: u32, const H: u32> {
  inner: ImageFileInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for ImageFileInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.inner.image.take()?;
    let source_size = image.dimensions();
    debug!(
      "图像缩放: {}x{} -> {}x{}",
      source_size.0, source_size.1, W, H
    );

    let data = if source_size == (W, H) {
      image.into_raw()
    } else {
      image::imageops::resize(&image, W, H, FilterType::Triangle).into_raw()
    };

    match RgbNhwcFrame::new(data, source_size) {
      Ok(frame) => Some(frame),
      Err(e) => {
        error!("构造输入帧失败: {}", e);
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::AsNhwcFrame;

  #[test]
  fn resizes_and_records_source_size() {
    let input = ImageFileInput::<4, 2>::from_image(RgbImage::from_pixel(8, 6, image::Rgb([9, 8, 7])));
    let mut frames = input.into_nhwc();
    let frame = frames.next().unwrap();
    assert_eq!(frame.source_size(), (8, 6));
    assert_eq!(frame.as_nhwc().len(), 4 * 2 * 3);
    assert_eq!(&frame.as_nhwc()[..3], &[9, 8, 7]);
    assert!(frames.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::<4, 2>::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
