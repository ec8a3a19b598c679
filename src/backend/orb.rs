use std::path::Path;

use opencv::core::{self, KeyPoint, Mat, Ptr, Size, Vector};
use opencv::features2d::{ORB, ORB_ScoreType};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

use super::KeypointDetector;
use crate::config::OrbOptions;
use crate::error::{Result, VisionError};

/// OpenCV ORB 特征点检测器
///
/// `Ptr<ORB>` 不能跨线程共享，因此每次检测都在阻塞线程中重新创建。
pub struct OrbDetector {
    opts: OrbOptions,
}

impl OrbDetector {
    /// 创建检测器，同时试探 OpenCV 是否能正常构造 ORB
    pub fn create(opts: OrbOptions) -> opencv::Result<Self> {
        create_orb(&opts)?;
        Ok(Self { opts })
    }
}

impl KeypointDetector for OrbDetector {
    fn detect(&self, path: &Path) -> Result<Vec<Vec<u8>>> {
        let run = || -> opencv::Result<Vec<Vec<u8>>> {
            let image = imread(path, self.opts.max_dimension as i32)?;
            let mut orb = create_orb(&self.opts)?;
            let (_, descriptors) = detect_and_compute(&mut orb, &image)?;
            mat_rows(&descriptors)
        };
        run().map_err(|e| VisionError::Extraction(format!("{}: {}", path.display(), e)))
    }
}

fn create_orb(opts: &OrbOptions) -> opencv::Result<Ptr<ORB>> {
    ORB::create(
        opts.orb_nfeatures as i32,
        opts.orb_scale_factor,
        opts.orb_nlevels as i32,
        31,
        0,
        2,
        ORB_ScoreType::HARRIS_SCORE,
        31,
        opts.orb_fast_threshold as i32,
    )
}

/// 以灰度模式读取图片，并将最长边限制在 `max_dimension` 以内
pub fn imread(path: &Path, max_dimension: i32) -> opencv::Result<Mat> {
    let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_GRAYSCALE)?;
    if image.empty() {
        return Err(opencv::Error::new(core::StsError, "unreadable or corrupt image"));
    }
    adjust_image_size(image, max_dimension)
}

/// 等比缩放图片，使宽高都不超过 `max_dimension`
pub fn adjust_image_size(image: Mat, max_dimension: i32) -> opencv::Result<Mat> {
    if image.cols() <= max_dimension && image.rows() <= max_dimension {
        return Ok(image);
    }
    let (ow, oh) = (image.cols() as f64, image.rows() as f64);
    let scale = (max_dimension as f64 / oh).min(max_dimension as f64 / ow);
    let mut output = Mat::default();
    imgproc::resize(
        &image,
        &mut output,
        Size::default(),
        scale,
        scale,
        imgproc::InterpolationFlags::INTER_AREA as i32,
    )?;
    Ok(output)
}

pub fn detect_and_compute(
    orb: &mut Ptr<ORB>,
    image: &Mat,
) -> opencv::Result<(Vector<KeyPoint>, Mat)> {
    let mask = Mat::default();
    let mut kps = Vector::<KeyPoint>::new();
    let mut des = Mat::default();
    orb.detect_and_compute(image, &mask, &mut kps, &mut des, false)?;
    Ok((kps, des))
}

/// 将 CV_8U 描述符矩阵拆成逐行的字节向量
fn mat_rows(descriptors: &Mat) -> opencv::Result<Vec<Vec<u8>>> {
    if descriptors.empty() {
        return Ok(vec![]);
    }
    let cols = descriptors.cols() as usize;
    Ok(descriptors.data_bytes()?.chunks_exact(cols).map(<[u8]>::to_vec).collect())
}
