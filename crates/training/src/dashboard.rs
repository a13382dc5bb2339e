//! Thin HTTP client for a Visdom visualization dashboard.
//!
//! The dashboard itself is an external service; this module only encodes
//! panes (base64 PNG data URIs) and posts Visdom `image`/`line` events to
//! its `/events` endpoint. Stable window names make each epoch overwrite
//! the previous panes in place.

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::io::Cursor;
use std::time::Duration;

const INPUT_WIN: &str = "fpn_input";
const TARGET_WIN: &str = "fpn_target";
const PREDICTION_WIN: &str = "fpn_prediction";
const LOSS_WIN: &str = "fpn_val_loss";

pub struct DashboardClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl DashboardClient {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build dashboard HTTP client")?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn push_image(&self, win: &str, caption: &str, png: &[u8]) -> anyhow::Result<()> {
        self.post_event(&image_event(win, caption, png))
    }

    /// Push the input/ground-truth/prediction panes for one epoch.
    pub fn push_epoch(
        &self,
        epoch: usize,
        input_png: &[u8],
        target_png: &[u8],
        prediction_png: &[u8],
    ) -> anyhow::Result<()> {
        self.push_image(INPUT_WIN, &format!("input (epoch {epoch})"), input_png)?;
        self.push_image(TARGET_WIN, &format!("ground truth (epoch {epoch})"), target_png)?;
        self.push_image(
            PREDICTION_WIN,
            &format!("prediction (epoch {epoch})"),
            prediction_png,
        )
    }

    pub fn append_loss(&self, epoch: usize, val_loss: f32) -> anyhow::Result<()> {
        self.post_event(&line_event(LOSS_WIN, epoch, val_loss))
    }

    fn post_event(&self, event: &Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(format!("{}/events", self.base))
            .json(event)
            .send()
            .with_context(|| format!("failed to reach dashboard at {}", self.base))?;
        if !resp.status().is_success() {
            anyhow::bail!("dashboard at {} returned {}", self.base, resp.status());
        }
        Ok(())
    }
}

fn image_event(win: &str, caption: &str, png: &[u8]) -> Value {
    json!({
        "win": win,
        "eventtype": "image",
        "title": caption,
        "data": [{
            "type": "image",
            "content": {
                "src": format!("data:image/png;base64,{}", BASE64.encode(png)),
                "caption": caption,
            },
        }],
    })
}

fn line_event(win: &str, epoch: usize, value: f32) -> Value {
    json!({
        "win": win,
        "eventtype": "line",
        "update": "append",
        "data": [{
            "type": "line",
            "x": [epoch],
            "y": [value],
        }],
    })
}

/// Encode a CHW float image (0..1) as a PNG pane.
pub fn rgb_png(width: u32, height: u32, chw: &[f32]) -> anyhow::Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    anyhow::ensure!(
        chw.len() == 3 * pixels,
        "expected {} channel values, got {}",
        3 * pixels,
        chw.len()
    );
    let mut img = image::RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) as usize;
            let r = to_u8(chw[i]);
            let g = to_u8(chw[pixels + i]);
            let b = to_u8(chw[2 * pixels + i]);
            img.put_pixel(x, y, image::Rgb([r, g, b]));
        }
    }
    encode_png(image::DynamicImage::ImageRgb8(img))
}

/// Encode an HW float map (0..1) as a grayscale PNG pane.
pub fn gray_png(width: u32, height: u32, hw: &[f32]) -> anyhow::Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    anyhow::ensure!(
        hw.len() == pixels,
        "expected {} map values, got {}",
        pixels,
        hw.len()
    );
    let mut img = image::GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) as usize;
            img.put_pixel(x, y, image::Luma([to_u8(hw[i])]));
        }
    }
    encode_png(image::DynamicImage::ImageLuma8(img))
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0) as u8
}

fn encode_png(img: image::DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .context("failed to encode PNG pane")?;
    Ok(buf.into_inner())
}
