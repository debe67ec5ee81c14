//! Catalog of physical line properties.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::LineTypeError;

/// Drag coefficient of a round line in cross flow.
pub const DEFAULT_CW: f64 = 1.1;

/// Weight per length [g/m] per squared diameter [mm²], fitted to the catalog entries.
const WEIGHT_PER_SQUARED_DIAMETER: f64 = 0.9;

/// Piecewise-linear relation between line force [N] and elongation [%].
///
/// Always holds at least two points; deserialization goes through [`LineType`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StretchCurve {
    /// `(force, elongation)` pairs sorted by force.
    points: Vec<(f64, f64)>,
}

impl StretchCurve {
    /// Build a curve from `(force, elongation)` pairs.
    ///
    /// A single measurement is interpreted as a straight line through the origin.
    ///
    /// # Errors
    ///
    /// Returns [`LineTypeError::EmptyStretchCurve`] when `points` is empty.
    pub fn new(name: &str, mut points: Vec<(f64, f64)>) -> Result<Self, LineTypeError> {
        if points.is_empty() {
            return Err(LineTypeError::EmptyStretchCurve {
                name: name.to_owned(),
            });
        }
        if points.len() == 1 {
            points.insert(0, (0.0, 0.0));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    /// Elongation in percent at `force`, extrapolating the outer segments.
    #[must_use]
    pub fn elongation(&self, force: f64) -> f64 {
        let segment = self
            .points
            .windows(2)
            .position(|pair| force <= pair[1].0)
            .unwrap_or(self.points.len() - 2);
        let (f0, e0) = self.points[segment];
        let (f1, e1) = self.points[segment + 1];
        if f1 == f0 {
            return e1;
        }
        e0 + (force - f0) * (e1 - e0) / (f1 - f0)
    }

    /// The stored `(force, elongation)` pairs.
    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

/// Physical properties of a line product.
///
/// Deserialized entries are checked like [`LineType::new`] checks its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LineTypeRecord")]
pub struct LineType {
    /// Catalog name, e.g. `liros.ltc80`.
    pub name: String,
    /// Diameter in metres.
    pub diameter: f64,
    /// Force/elongation relation.
    pub stretch_curve: StretchCurve,
    /// Minimum break load in newtons.
    pub min_break_load: Option<f64>,
    /// Weight in grams per metre.
    pub weight: Option<f64>,
    /// Drag coefficient.
    pub cw: f64,
    /// Whether the core is covered by a sheath.
    pub sheathed: bool,
    /// Length added for sewn terminations in metres.
    pub seam_correction: f64,
    /// Available colours as hex strings keyed by colour name.
    pub colors: BTreeMap<String, String>,
}

impl LineType {
    /// Create a line type from catalog units (diameter in millimetres).
    ///
    /// # Errors
    ///
    /// Returns [`LineTypeError`] when the diameter is not positive or the stretch
    /// curve is empty.
    ///
    /// # Examples
    /// ```
    /// use linesetx::LineType;
    ///
    /// let line_type = LineType::new("test", 1.0, vec![(100.0, 1.0)], Some(1000.0), Some(0.8))
    ///     .expect("valid line type");
    /// assert!((line_type.get_stretch_factor(100.0) - 1.01).abs() < 1.0e-12);
    /// ```
    pub fn new(
        name: &str,
        diameter_mm: f64,
        stretch: Vec<(f64, f64)>,
        min_break_load: Option<f64>,
        weight: Option<f64>,
    ) -> Result<Self, LineTypeError> {
        check_diameter(name, diameter_mm)?;
        Ok(Self {
            name: name.to_owned(),
            diameter: diameter_mm / 1000.0,
            stretch_curve: StretchCurve::new(name, stretch)?,
            min_break_load,
            weight,
            cw: DEFAULT_CW,
            sheathed: false,
            seam_correction: 0.0,
            colors: BTreeMap::new(),
        })
    }

    /// Check the invariants of a line type assembled from its public fields.
    ///
    /// # Errors
    ///
    /// Returns [`LineTypeError::NonPositiveDiameter`] when the diameter is not positive.
    pub fn validate(&self) -> Result<(), LineTypeError> {
        check_diameter(&self.name, self.diameter * 1000.0)
    }

    /// Mark the line as sheathed.
    #[must_use]
    pub fn sheathed(mut self, sheathed: bool) -> Self {
        self.sheathed = sheathed;
        self
    }

    /// Replace the drag coefficient.
    #[must_use]
    pub fn with_cw(mut self, cw: f64) -> Self {
        self.cw = cw;
        self
    }

    /// Replace the seam correction (metres).
    #[must_use]
    pub fn with_seam_correction(mut self, seam_correction: f64) -> Self {
        self.seam_correction = seam_correction;
        self
    }

    /// Add named colour variants.
    #[must_use]
    pub fn with_colors(mut self, colors: &[(&str, &str)]) -> Self {
        for (name, hex) in colors {
            self.colors.insert((*name).to_owned(), (*hex).to_owned());
        }
        self
    }

    /// Ratio of stretched to unloaded length at `force`.
    #[must_use]
    pub fn get_stretch_factor(&self, force: f64) -> f64 {
        1.0 + self.stretch_curve.elongation(force) / 100.0
    }

    /// Axial spring constant [N] derived from the last curve point.
    #[must_use]
    pub fn get_spring_constant(&self) -> f64 {
        let (force, elongation) = self.stretch_curve.points[self.stretch_curve.points.len() - 1];
        if elongation == 0.0 {
            return f64::INFINITY;
        }
        force / (elongation / 100.0)
    }

    /// Estimated weight in g/m from the diameter.
    #[must_use]
    pub fn predict_weight(&self) -> f64 {
        let diameter_mm = self.diameter * 1000.0;
        WEIGHT_PER_SQUARED_DIAMETER * diameter_mm * diameter_mm
    }

    /// Weight in g/m, predicted from the diameter when none is recorded.
    #[must_use]
    pub fn weight_per_length(&self) -> f64 {
        match self.weight {
            Some(weight) => weight,
            None => {
                warn!(
                    line_type = %self.name,
                    "predicting weight of line type by diameter; add a weight to the catalog"
                );
                self.predict_weight()
            }
        }
    }
}

fn check_diameter(name: &str, diameter_mm: f64) -> Result<(), LineTypeError> {
    if diameter_mm.is_nan() || diameter_mm <= 0.0 {
        return Err(LineTypeError::NonPositiveDiameter {
            name: name.to_owned(),
            diameter: diameter_mm,
        });
    }
    Ok(())
}

/// Serialized form of [`StretchCurve`].
#[derive(Deserialize)]
struct StretchCurveRecord {
    points: Vec<(f64, f64)>,
}

/// Serialized form of [`LineType`], validated on conversion.
#[derive(Deserialize)]
struct LineTypeRecord {
    name: String,
    diameter: f64,
    stretch_curve: StretchCurveRecord,
    #[serde(default)]
    min_break_load: Option<f64>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default = "default_cw")]
    cw: f64,
    #[serde(default)]
    sheathed: bool,
    #[serde(default)]
    seam_correction: f64,
    #[serde(default)]
    colors: BTreeMap<String, String>,
}

fn default_cw() -> f64 {
    DEFAULT_CW
}

impl TryFrom<LineTypeRecord> for LineType {
    type Error = LineTypeError;

    fn try_from(record: LineTypeRecord) -> Result<Self, Self::Error> {
        // The diameter is stored in metres; rescaling would not round-trip exactly.
        check_diameter(&record.name, record.diameter * 1000.0)?;
        let stretch_curve = StretchCurve::new(&record.name, record.stretch_curve.points)?;
        Ok(Self {
            name: record.name,
            diameter: record.diameter,
            stretch_curve,
            min_break_load: record.min_break_load,
            weight: record.weight,
            cw: record.cw,
            sheathed: record.sheathed,
            seam_correction: record.seam_correction,
            colors: record.colors,
        })
    }
}

impl std::fmt::Display for LineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Named collection of shared line types.
#[derive(Clone, Debug, Default)]
pub struct LineTypeRegistry {
    types: BTreeMap<String, Arc<LineType>>,
}

/// Name of the fallback line type.
pub const DEFAULT_LINE_TYPE: &str = "default";

const EDELRID_8001_COLORS: &[(&str, &str)] = &[
    ("orange", "ff6600"),
    ("blue", "0f52ba"),
    ("magenta", "c92351"),
    ("nature", "cabb84"),
];

const EDELRID_6843_COLORS: &[(&str, &str)] = &[
    ("sky", "0095d8"),
    ("yellow", "ffdd00"),
    ("green", "009037"),
    ("fluored", "eb6a27"),
    ("red", "e2001a"),
];

const EDELRID_7343_COLORS: &[(&str, &str)] = &[
    ("fluored", "f70000"),
    ("sky", "b2d4dd"),
    ("citrus", "f5ff00"),
];

/// Edelrid A-8001 (unsheathed aramid): strength [daN], diameter [mm], weight [g/m].
const EDELRID_8001: &[(u32, f64, f64)] = &[
    (25, 0.4, 0.15),
    (50, 0.5, 0.25),
    (70, 0.7, 0.4),
    (90, 0.8, 0.55),
    (130, 1.0, 0.8),
    (135, 1.1, 0.85),
    (190, 1.2, 1.1),
    (230, 1.5, 1.4),
    (280, 1.7, 1.7),
    (340, 1.9, 2.1),
    (470, 2.2, 2.8),
];

const EDELRID_6843: &[(u32, f64, f64)] = &[
    (140, 1.4, 1.5),
    (180, 1.5, 1.8),
    (230, 1.9, 2.8),
    (280, 2.1, 3.2),
    (370, 2.4, 4.6),
];

const EDELRID_7343: &[(u32, f64, f64)] = &[
    (75, 1.0, 0.70),
    (90, 1.2, 1.10),
    (140, 1.3, 1.40),
    (190, 1.5, 1.80),
    (230, 1.7, 2.40),
    (280, 1.8, 2.60),
    (340, 2.1, 3.70),
    (420, 2.3, 4.10),
];

/// Liros catalog: name, diameter [mm], stretch curve, break load [N], weight [g/m].
type CatalogEntry = (&'static str, f64, &'static [(f64, f64)], f64, f64);

const LIROS: &[CatalogEntry] = &[
    ("liros.ltc25", 0.39, &[(250.0, 4.8)], 250.0, 0.13),
    ("liros.ltc45", 0.55, &[(100.0, 0.85)], 450.0, 0.28),
    ("liros.ltc65", 0.65, &[(100.0, 0.8)], 650.0, 0.45),
    ("liros.ltc80", 0.7, &[(100.0, 0.65), (300.0, 1.65)], 800.0, 0.57),
    ("liros.ltc120", 1.1, &[(100.0, 0.6), (300.0, 1.2)], 1200.0, 0.84),
    ("liros.ltc160", 1.2, &[(100.0, 0.55), (300.0, 1.05)], 1600.0, 1.17),
    ("liros.ltc200", 1.3, &[(100.0, 0.6), (300.0, 1.1)], 2000.0, 1.42),
    ("liros.ltc350", 1.75, &[(100.0, 0.35), (300.0, 0.8)], 3500.0, 2.16),
    ("liros.ltc400", 1.9, &[(100.0, 0.35), (300.0, 0.89)], 4000.0, 2.89),
    ("liros.ntsl120", 1.25, &[(100.0, 0.29), (300.0, 0.94)], 1200.0, 1.24),
    ("liros.ntsl160", 1.4, &[(100.0, 0.235), (300.0, 0.797)], 1600.0, 1.52),
    ("liros.ntsl200", 1.9, &[(100.0, 0.55), (300.0, 1.34)], 2000.0, 2.66),
    ("liros.ntsl250", 2.15, &[(100.0, 0.46), (300.0, 1.38)], 2500.0, 3.37),
    ("liros.ntsl350", 2.25, &[(100.0, 0.23), (300.0, 0.46)], 3500.0, 3.46),
    ("liros.tsl090", 1.2, &[(100.0, 0.45), (300.0, 1.38)], 900.0, 1.06),
    ("liros.tsl115", 1.25, &[(100.0, 0.42), (300.0, 1.21)], 1150.0, 1.18),
    ("liros.tsl140", 1.3, &[(100.0, 0.25), (300.0, 0.88)], 1400.0, 1.39),
    ("liros.tsl190", 1.55, &[(100.0, 0.25), (300.0, 0.71)], 1900.0, 1.76),
    ("liros.tsl220", 1.65, &[(100.0, 0.29), (300.0, 0.75)], 2200.0, 2.12),
    ("liros.tsl280", 1.8, &[(100.0, 0.17), (300.0, 0.46)], 2800.0, 2.55),
    ("liros.tsl380", 2.2, &[(100.0, 0.18), (300.0, 0.46)], 3800.0, 3.46),
    ("liros.tsl500", 2.37, &[(100.0, 0.16), (300.0, 0.42)], 5000.0, 4.6),
    // brake lines
    ("liros.dfl115", 1.4, &[(1000.0, 0.0)], 1150.0, 1.18),
    ("liros.dfl200", 2.0, &[(1000.0, 0.0)], 2000.0, 3.1),
    ("liros.dfl232", 1.9, &[(1000.0, 0.0)], 2000.0, 2.58),
    ("liros.dfl350", 2.7, &[(1000.0, 0.0)], 3500.0, 4.98),
    ("liros.dsl25", 0.8, &[(340.0, 3.7)], 250.0, 0.53),
    ("liros.dsl35", 0.9, &[(380.0, 3.6)], 350.0, 0.64),
    ("liros.dsl70", 0.95, &[(100.0, 0.19), (300.0, 0.41)], 700.0, 0.67),
    ("liros.dsl110", 1.2, &[(100.0, 0.23), (300.0, 0.73)], 1100.0, 1.02),
    ("liros.dsl140", 1.25, &[(100.0, 0.54), (300.0, 0.42)], 1400.0, 1.14),
    ("liros.dsl350", 2.0, &[(100.0, 0.15), (300.0, 0.33)], 3500.0, 3.25),
    ("liros.dsl600", 2.4, &[(100.0, 0.08), (300.0, 0.24)], 6000.0, 4.3),
];

impl LineTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog of known line products.
    pub fn builtin() -> &'static LineTypeRegistry {
        static BUILTIN: OnceLock<LineTypeRegistry> = OnceLock::new();
        BUILTIN.get_or_init(Self::catalog)
    }

    /// Register a line type, replacing any entry with the same name.
    pub fn insert(&mut self, line_type: LineType) -> Arc<LineType> {
        let line_type = Arc::new(line_type);
        self.types
            .insert(line_type.name.clone(), Arc::clone(&line_type));
        line_type
    }

    /// Look up a line type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<LineType>> {
        self.types.get(name).cloned()
    }

    /// Names of all registered line types in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of registered line types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn catalog() -> Self {
        let mut registry = Self::new();
        let mut add = |line_type: Result<LineType, LineTypeError>| match line_type {
            Ok(line_type) => {
                registry.insert(line_type);
            }
            Err(error) => warn!(%error, "skipping invalid catalog entry"),
        };

        add(LineType::new(
            DEFAULT_LINE_TYPE,
            1.0,
            vec![(100.0, 0.5)],
            Some(1000.0),
            None,
        ));
        for &(strength, diameter, weight) in EDELRID_8001 {
            add(edelrid("A-8001", strength, diameter, weight)
                .map(|lt| lt.with_colors(EDELRID_8001_COLORS)));
        }
        for &(strength, diameter, weight) in EDELRID_6843 {
            add(edelrid("A-6843", strength, diameter, weight)
                .map(|lt| lt.sheathed(true).with_colors(EDELRID_6843_COLORS)));
        }
        for &(strength, diameter, weight) in EDELRID_7343 {
            add(edelrid("A-7343", strength, diameter, weight)
                .map(|lt| lt.sheathed(true).with_colors(EDELRID_7343_COLORS)));
        }
        for &(name, diameter, stretch, break_load, weight) in LIROS {
            add(LineType::new(
                name,
                diameter,
                stretch.to_vec(),
                Some(break_load),
                Some(weight),
            ));
        }
        registry
    }
}

/// Edelrid lines are rated in daN and stretch 5 % at their break load.
fn edelrid(
    series: &str,
    strength: u32,
    diameter: f64,
    weight: f64,
) -> Result<LineType, LineTypeError> {
    let break_load = 10.0 * f64::from(strength);
    LineType::new(
        &format!("edelrid.{series}-{strength:03}"),
        diameter,
        vec![(break_load, 5.0)],
        Some(break_load),
        Some(weight),
    )
}
