use gazex_core::{INVALID_PIXEL, Vec2, invalid_pixel, is_invalid_pixel};
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::device::{RawSample, TrackedEye};
use crate::error::EyeError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_vec(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

/// Coefficients mapping raw tracker output to screen pixels, as delivered by the
/// calibration source. Field aliases accept the names used by older calibration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParameters {
    #[serde(alias = "el_offsets")]
    pub offsets: [f32; 2],
    #[serde(alias = "el_gains")]
    pub gains: [f32; 2],
    /// Projective transform, row by row.
    #[serde(alias = "t_transform")]
    pub transform: [f32; 9],
    #[serde(alias = "t_offset")]
    pub rotation_offsets: [f32; 2],
    /// 2x2 rotation, column-major.
    #[serde(alias = "t_rotation")]
    pub rotation: [f32; 4],
    #[serde(alias = "pix_per_deg")]
    pub pixels_per_degree: f32,
    /// Resolution of the display the calibration was computed on.
    pub reference_resolution: Resolution,
    #[serde(alias = "el_IP")]
    pub address: String,
    pub tracked_eye: TrackedEye,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            offsets: [0.0; 2],
            gains: [1.0; 2],
            transform: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            rotation_offsets: [0.0; 2],
            rotation: [1.0, 0.0, 0.0, 1.0],
            pixels_per_degree: 30.0,
            reference_resolution: Resolution::default(),
            address: "100.1.1.1".to_string(),
            tracked_eye: TrackedEye::Unknown,
        }
    }
}

impl CalibrationParameters {
    /// Parses a calibration file. Older files give the reference resolution as
    /// `ml_x_res`/`ml_y_res` and the eye as an integer `el_eyeID`; the current names win
    /// when both are present.
    pub fn from_json(json: &str) -> Result<Self, EyeError> {
        let legacy: LegacyFields = serde_json::from_str(json)?;
        let mut params: Self = serde_json::from_str(json)?;
        legacy.apply(&mut params);
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), EyeError> {
        let coefficients = self
            .offsets
            .iter()
            .chain(&self.gains)
            .chain(&self.transform)
            .chain(&self.rotation_offsets)
            .chain(&self.rotation);
        if coefficients.into_iter().any(|c| !c.is_finite()) {
            return Err(EyeError::InvalidCalibration(
                "non-finite coefficient".to_string(),
            ));
        }
        if !(self.pixels_per_degree.is_finite() && self.pixels_per_degree > 0.0) {
            return Err(EyeError::InvalidCalibration(format!(
                "pixels per degree must be positive, got {}",
                self.pixels_per_degree
            )));
        }
        if self.reference_resolution.width == 0 || self.reference_resolution.height == 0 {
            return Err(EyeError::InvalidCalibration(
                "reference resolution must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LegacyFields {
    ml_x_res: Option<f64>,
    ml_y_res: Option<f64>,
    #[serde(rename = "el_eyeID")]
    eye_id: Option<i64>,
    reference_resolution: Option<IgnoredAny>,
    tracked_eye: Option<IgnoredAny>,
}

impl LegacyFields {
    fn apply(&self, params: &mut CalibrationParameters) {
        if self.reference_resolution.is_none() {
            // non-positive sizes become 0 and fail validation
            let res = &mut params.reference_resolution;
            if let Some(x) = self.ml_x_res {
                res.width = x.round() as u32;
            }
            if let Some(y) = self.ml_y_res {
                res.height = y.round() as u32;
            }
        }
        if let (None, Some(id)) = (&self.tracked_eye, self.eye_id) {
            params.tracked_eye = match id {
                0 => TrackedEye::Left,
                1 => TrackedEye::Right,
                2 => TrackedEye::Binocular,
                other => {
                    warn!("unknown el_eyeID {}, eye left to the tracker", other);
                    TrackedEye::Unknown
                }
            };
        }
    }
}

/// A calibrated gaze point. `degrees` is only produced by the raw-transducer pipeline.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CalibratedGaze {
    pub degrees: Option<Vec2>,
    /// Screen pixels, origin bottom-left, invalid axes set to -1.
    pub pixels: Vec2,
}

impl CalibratedGaze {
    pub fn invalid() -> Self {
        Self {
            degrees: None,
            pixels: invalid_pixel(),
        }
    }
}

/// Current calibration for one device plus the render surface it maps onto.
#[derive(Debug, Clone, Default)]
pub struct CalibrationModel {
    display: Resolution,
    params: Option<CalibrationParameters>,
}

impl CalibrationModel {
    pub fn new(display: Resolution) -> Self {
        Self {
            display,
            params: None,
        }
    }

    pub fn display(&self) -> Resolution {
        self.display
    }

    /// Replaces the active parameter set. Rejected parameters leave the previous set in
    /// place.
    pub fn apply_calibration(&mut self, params: CalibrationParameters) -> Result<(), EyeError> {
        params.validate()?;
        info!(
            "calibration applied: {} px/deg, reference {}x{}, tracker {}",
            params.pixels_per_degree,
            params.reference_resolution.width,
            params.reference_resolution.height,
            params.address
        );
        self.params = Some(params);
        Ok(())
    }

    pub fn has_calibration(&self) -> bool {
        self.params.is_some()
    }

    pub fn parameters(&self) -> Option<&CalibrationParameters> {
        self.params.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.params.as_ref().map(|p| p.address.as_str())
    }

    pub fn tracked_eye(&self) -> Option<TrackedEye> {
        self.params.as_ref().map(|p| p.tracked_eye)
    }

    pub fn to_pixels(&self, raw: &RawSample) -> CalibratedGaze {
        match raw {
            RawSample::Adcs(p) => CalibratedGaze {
                degrees: None,
                pixels: self.adcs_to_pixels(*p),
            },
            RawSample::Transducer(p) => self.raw_to_pixels(*p),
        }
    }

    /// Normalized display coordinates to pixels, flipping the origin to the bottom-left.
    /// A sample outside the unit square is invalid as a whole.
    pub fn adcs_to_pixels(&self, adcs: Vec2) -> Vec2 {
        let on_display = |v: f32| (0.0..=1.0).contains(&v);
        if !(on_display(adcs.x) && on_display(adcs.y)) {
            return invalid_pixel();
        }
        let res = self.display.as_vec();
        self.clamp(Vec2::new(adcs.x * res.x, (1.0 - adcs.y) * res.y))
    }

    /// Raw transducer counts to degrees and pixels. Without a calibration there is no
    /// gaze.
    pub fn raw_to_pixels(&self, raw: Vec2) -> CalibratedGaze {
        let Some(p) = &self.params else {
            return CalibratedGaze::invalid();
        };

        let adj = Vector3::new(
            (raw.x - p.offsets[0]) * p.gains[0],
            (raw.y - p.offsets[1]) * p.gains[1],
            1.0,
        );

        // Stored coefficients are applied transposed. Calibration files depend on this
        // order; do not change it.
        let t = &p.transform;
        let m = Matrix3::new(t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7], t[8]);
        let v = m.transpose() * adj;
        let v = v / v.z;

        let (dx, dy) = (v.x - p.rotation_offsets[0], v.y - p.rotation_offsets[1]);
        let r = &p.rotation;
        let degrees = Vec2::new(dx * r[0] + dy * r[2], dx * r[1] + dy * r[3]);

        CalibratedGaze {
            degrees: Some(degrees),
            pixels: self.project(p, degrees),
        }
    }

    /// Degrees of visual angle to pixels using the current calibration's scale. Used by
    /// playback of gaze recorded in degrees.
    pub fn degrees_to_pixels(&self, degrees: Vec2) -> Vec2 {
        match &self.params {
            Some(p) => self.project(p, degrees),
            None => invalid_pixel(),
        }
    }

    /// Inverse of [`raw_to_pixels`](Self::raw_to_pixels): the transducer counts that land
    /// on `pixels`. `None` without a calibration, for an off-screen point, or when the
    /// calibration cannot be inverted.
    pub fn pixels_to_raw(&self, pixels: Vec2) -> Option<Vec2> {
        let p = self.params.as_ref()?;
        if is_invalid_pixel(&pixels) {
            return None;
        }
        let res = self.display.as_vec();
        let reference = p.reference_resolution.as_vec();
        let degrees = Vector2::new(
            (pixels.x - 0.5 * res.x) / (p.pixels_per_degree * res.x / reference.x),
            (pixels.y - 0.5 * res.y) / (p.pixels_per_degree * res.y / reference.y),
        );

        let r = &p.rotation;
        let d = Matrix2::new(r[0], r[2], r[1], r[3]).try_inverse()? * degrees;
        let v = Vector3::new(d.x + p.rotation_offsets[0], d.y + p.rotation_offsets[1], 1.0);

        let t = &p.transform;
        let m = Matrix3::new(t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7], t[8]);
        let adj = m.transpose().try_inverse()? * v;
        let adj = adj / adj.z;

        let raw = Vec2::new(
            adj.x / p.gains[0] + p.offsets[0],
            adj.y / p.gains[1] + p.offsets[1],
        );
        (raw.x.is_finite() && raw.y.is_finite()).then_some(raw)
    }

    fn project(&self, p: &CalibrationParameters, degrees: Vec2) -> Vec2 {
        let res = self.display.as_vec();
        let reference = p.reference_resolution.as_vec();
        let pixels = Vec2::new(
            degrees.x * (p.pixels_per_degree * res.x / reference.x) + 0.5 * res.x,
            degrees.y * (p.pixels_per_degree * res.y / reference.y) + 0.5 * res.y,
        );
        self.clamp(pixels)
    }

    /// Per-axis bounds check, inclusive of the resolution edge.
    fn clamp(&self, mut pixels: Vec2) -> Vec2 {
        let res = self.display.as_vec();
        if !(0.0..=res.x).contains(&pixels.x) {
            pixels.x = INVALID_PIXEL;
        }
        if !(0.0..=res.y).contains(&pixels.y) {
            pixels.y = INVALID_PIXEL;
        }
        pixels
    }
}
