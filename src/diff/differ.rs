use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("image error for {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// 变化区域的最小外接矩形
///
/// 坐标为半开区间: `right` 与 `bottom` 不包含在内,
/// 因此 `(x, y)` 处的单个像素对应 `(x, y, x + 1, y + 1)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// 一次比较的结果,仅在单次比较调用中存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceResult {
    pub bounding_box: Option<BoundingBox>,
    pub changed_pixels: u64,
    pub dimensions_changed: bool,
}

impl DifferenceResult {
    pub fn changed(&self) -> bool {
        self.bounding_box.is_some()
    }
}

/// 逐像素比较两张图片
///
/// 任一通道(含 alpha)不同即视为该像素变化。尺寸不同时视为整张图变化,
/// 外接矩形覆盖较新的图片 `current`。
pub fn compute_difference(previous: &DynamicImage, current: &DynamicImage) -> DifferenceResult {
    if previous.dimensions() != current.dimensions() {
        let (width, height) = current.dimensions();
        debug!(
            "Dimensions changed: {:?} -> {:?}",
            previous.dimensions(),
            current.dimensions()
        );
        return DifferenceResult {
            bounding_box: Some(BoundingBox::new(0, 0, width, height))
                .filter(|bbox| !bbox.is_empty()),
            changed_pixels: u64::from(width) * u64::from(height),
            dimensions_changed: true,
        };
    }

    let a = previous.to_rgba8();
    let b = current.to_rgba8();

    let mut bbox: Option<BoundingBox> = None;
    let mut changed_pixels = 0u64;

    for (x, y, pa) in a.enumerate_pixels() {
        if pa == b.get_pixel(x, y) {
            continue;
        }
        changed_pixels += 1;
        bbox = Some(match bbox {
            None => BoundingBox::new(x, y, x + 1, y + 1),
            Some(bb) => BoundingBox::new(
                bb.left.min(x),
                bb.top.min(y),
                bb.right.max(x + 1),
                bb.bottom.max(y + 1),
            ),
        });
    }

    DifferenceResult {
        bounding_box: bbox,
        changed_pixels,
        dimensions_changed: false,
    }
}

/// 逐通道绝对差图像 `D[x,y,c] = |A[x,y,c] - B[x,y,c]|`
///
/// 尺寸不同时只比较两者的重叠部分。
pub fn difference_image(previous: &DynamicImage, current: &DynamicImage) -> RgbaImage {
    let a = previous.to_rgba8();
    let b = current.to_rgba8();
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());

    RgbaImage::from_fn(width, height, |x, y| {
        let pa = a.get_pixel(x, y).0;
        let pb = b.get_pixel(x, y).0;
        Rgba(std::array::from_fn(|c| pa[c].abs_diff(pb[c])))
    })
}

/// 读取快照,文件不存在时返回 `None`
pub fn load_snapshot(path: &Path) -> Result<Option<DynamicImage>, DiffError> {
    if !path.try_exists()? {
        return Ok(None);
    }

    image::open(path)
        .map(Some)
        .map_err(|source| DiffError::Image {
            path: path.display().to_string(),
            source,
        })
}
