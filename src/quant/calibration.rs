//! Calibration export.

pub use super::*;

/// Calibration state of one quantized port.
#[derive(Config, Debug)]
pub struct PortCalibration {
    /// Operation name.
    pub op: String,
    /// Port name.
    pub port: String,
    /// Bit width.
    pub bits: usize,
    /// Unit step size.
    pub scale: f32,
    /// Grid position of the real zero.
    pub zero_point: f32,
    /// Tracked minimum of the real range.
    pub tracked_min: f32,
    /// Tracked maximum of the real range.
    pub tracked_max: f32,
}

impl PortCalibration {
    /// Initialize a record from resolved grid parameters.
    pub fn from_params(
        op: OpId,
        port: Port,
        bits: usize,
        params: &AffineParams,
        tracked_min: f32,
        tracked_max: f32,
    ) -> Self {
        Self::new(
            op.name().to_string(),
            port.name().to_string(),
            bits,
            params.scale,
            params.zero_point,
            tracked_min,
            tracked_max,
        )
    }
}

/// The exportable calibration snapshot of a compression strategy.
///
/// ## Details
///
/// Serializes to JSON through [`Config::save`] and [`fmt::Display`].
#[derive(Config, Debug)]
pub struct CalibrationConfig {
    /// Strategy family name.
    pub strategy: String,
    /// Quantized ports in forward order.
    pub ports: Vec<PortCalibration>,
}

#[cfg(test)]
mod tests {
    #[test]
    fn snapshots_render_as_json() {
        use super::*;

        let params = AffineParams::from_range(8, -1.0, 1.0);
        let port = PortCalibration::from_params(
            OpId::Fc1,
            Port::Weight,
            8,
            &params,
            -1.0,
            1.0,
        );
        let calibration = CalibrationConfig::new("qat".to_string(), vec![port]);

        let rendered = calibration.to_string();
        assert!(rendered.contains("\"strategy\""));
        assert!(rendered.contains("\"qat\""));
        assert!(rendered.contains("\"fc1\""));
        assert!(rendered.contains("\"weight\""));
    }
}
