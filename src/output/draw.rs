// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{geometry::BBox, model::DetectResult};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  /// 在图像上绘制检测框，bbox 为图像像素坐标 [x_min, y_min, x_max, y_max]
  pub fn draw_bbox(&self, image: &mut RgbImage, bbox: &BBox) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    for t in 0..self.thickness {
      let (left, top) = (x_min + t, y_min + t);
      let (right, bottom) = (x_max - t, y_max - t);
      if left >= right || top >= bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      self.draw_bbox(image, &item.bbox);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn outlines_inside_the_image() {
    let mut image = RgbImage::new(20, 20);
    Draw::default().draw_bbox(&mut image, &[2.0, 3.0, 10.0, 12.0]);
    assert_eq!(image.get_pixel(2, 3), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(10, 12), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(3, 4), &Rgb(BOX_COLOR));
    // 框内部不填充
    assert_eq!(image.get_pixel(6, 7), &Rgb([0, 0, 0]));
  }

  #[test]
  fn clamps_boxes_outside_the_image() {
    let mut image = RgbImage::new(10, 10);
    Draw::default()
      .with_color([255, 0, 0])
      .draw_bbox(&mut image, &[-5.0, -5.0, 50.0, 50.0]);
    assert_eq!(image.get_pixel(0, 0), &Rgb([255, 0, 0]));
    assert_eq!(image.get_pixel(9, 9), &Rgb([255, 0, 0]));
  }
}
