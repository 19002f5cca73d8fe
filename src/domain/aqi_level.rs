/// US EPA PM2.5 breakpoints: (concentration low, concentration high, index low, index high).
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 7] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 350.4, 301.0, 400.0),
    (350.5, 500.4, 401.0, 500.0),
];
const MAX_AQI: u32 = 500;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MeasurementError {
    #[error("{0} is not a valid PM2.5 measurement: it must not be negative")]
    Negative(f64),
    #[error("PM2.5 measurement is not a number")]
    NotANumber,
}

/// Discrete severity bucket for a PM2.5 concentration, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum AqiLevel {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiLevel {
    pub fn from_measurement(pm25: f64) -> Result<AqiLevel, MeasurementError> {
        let concentration = truncate(pm25)?;

        let level = if concentration <= 12.0 {
            AqiLevel::Good
        } else if concentration <= 35.4 {
            AqiLevel::Moderate
        } else if concentration <= 55.4 {
            AqiLevel::UnhealthyForSensitiveGroups
        } else if concentration <= 150.4 {
            AqiLevel::Unhealthy
        } else if concentration <= 250.4 {
            AqiLevel::VeryUnhealthy
        } else {
            AqiLevel::Hazardous
        };

        Ok(level)
    }

    /// `None` means the measurement was never observed. It maps to `None`, which is
    /// distinct from every real level.
    pub fn from_last_measurement(pm25: Option<f64>) -> Result<Option<AqiLevel>, MeasurementError> {
        pm25.map(AqiLevel::from_measurement).transpose()
    }

    pub fn display(&self) -> &'static str {
        match self {
            AqiLevel::Good => "Good",
            AqiLevel::Moderate => "Moderate",
            AqiLevel::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiLevel::Unhealthy => "Unhealthy",
            AqiLevel::VeryUnhealthy => "Very Unhealthy",
            AqiLevel::Hazardous => "Hazardous",
        }
    }
}

impl std::fmt::Display for AqiLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display())
    }
}

/// Converts a PM2.5 concentration (µg/m³) into the US EPA Air Quality Index.
pub fn pm25_to_aqi(pm25: f64) -> Result<u32, MeasurementError> {
    let concentration = truncate(pm25)?;

    let breakpoint = PM25_BREAKPOINTS
        .iter()
        .find(|(_, c_high, _, _)| concentration <= *c_high);

    match breakpoint {
        Some((c_low, c_high, i_low, i_high)) => {
            let aqi = (i_high - i_low) / (c_high - c_low) * (concentration - c_low) + i_low;
            Ok(aqi.round() as u32)
        }
        None => Ok(MAX_AQI),
    }
}

// EPA breakpoints are defined with one decimal, so readings are truncated before lookup.
fn truncate(pm25: f64) -> Result<f64, MeasurementError> {
    if pm25.is_nan() {
        return Err(MeasurementError::NotANumber);
    }

    if pm25 < 0.0 {
        return Err(MeasurementError::Negative(pm25));
    }

    Ok((pm25 * 10.0).floor() / 10.0)
}
