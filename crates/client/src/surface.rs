//! The map surface as a capability, plus two headless implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use provenance_core::symbol::{LegendEntry, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Initial camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: LatLng,
    pub zoom: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(LatLng),
    Line(Vec<LatLng>),
}

/// Title plus body lines shown when a graphic is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Popup {
    pub title: String,
    pub lines: Vec<String>,
}

impl Popup {
    pub fn to_text(&self) -> String {
        let mut out = self.title.clone();
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

/// View-model for one drawn feature. Lives only until the next redraw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graphic {
    pub geometry: Geometry,
    pub symbol: Symbol,
    /// Queryable attributes (batch id, event, status, ...).
    pub attributes: BTreeMap<String, String>,
    pub popup: Option<Popup>,
}

/// UI controls a session can add to the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapControl {
    Zoom,
    Legend(Vec<LegendEntry>),
}

/// Anything that can display the overlay.
///
/// Implementations are driven from one task at a time and need not be `Sync`.
pub trait MapSurface: Send + 'static {
    /// Starts from a blank map: graphics and controls from an earlier
    /// initialization are dropped.
    fn initialize(&mut self, token: &str, view: &MapView) -> Result<(), RenderError>;
    /// Hands a renewed access token to the surface.
    fn update_token(&mut self, token: &str) -> Result<(), RenderError>;
    fn clear(&mut self) -> Result<(), RenderError>;
    fn draw_point(&mut self, graphic: &Graphic) -> Result<(), RenderError>;
    fn draw_line(&mut self, graphic: &Graphic) -> Result<(), RenderError>;
    fn show_popup(&mut self, at: LatLng, popup: &Popup) -> Result<(), RenderError>;
    fn add_control(&mut self, control: MapControl) -> Result<(), RenderError>;
    /// Called once after a full redraw.
    fn flush(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
    fn destroy(&mut self);
}

/// Everything an [`InMemorySurface`] has been told.
#[derive(Debug, Default, Clone)]
pub struct SurfaceRecord {
    pub token: Option<String>,
    pub view: Option<MapView>,
    pub graphics: Vec<Graphic>,
    pub controls: Vec<MapControl>,
    pub popups: Vec<(LatLng, Popup)>,
    pub clears: usize,
    pub flushes: usize,
    pub token_updates: usize,
    pub destroyed: bool,
    pub unavailable: bool,
}

/// Recording surface for tests and embedding. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct InMemorySurface {
    inner: Arc<Mutex<SurfaceRecord>>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SurfaceRecord {
        self.lock().clone()
    }

    /// Makes every subsequent drawing call fail, like a torn-down canvas.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceRecord> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn usable(&self) -> Result<MutexGuard<'_, SurfaceRecord>, RenderError> {
        let rec = self.lock();
        if rec.destroyed {
            return Err(RenderError::Destroyed);
        }
        if rec.unavailable {
            return Err(RenderError::SurfaceUnavailable("surface marked unavailable".into()));
        }
        Ok(rec)
    }
}

impl MapSurface for InMemorySurface {
    fn initialize(&mut self, token: &str, view: &MapView) -> Result<(), RenderError> {
        let mut rec = self.usable()?;
        rec.token = Some(token.to_string());
        rec.view = Some(*view);
        rec.graphics.clear();
        rec.controls.clear();
        rec.popups.clear();
        Ok(())
    }

    fn update_token(&mut self, token: &str) -> Result<(), RenderError> {
        let mut rec = self.usable()?;
        rec.token = Some(token.to_string());
        rec.token_updates += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        let mut rec = self.usable()?;
        rec.graphics.clear();
        rec.clears += 1;
        Ok(())
    }

    fn draw_point(&mut self, graphic: &Graphic) -> Result<(), RenderError> {
        self.usable()?.graphics.push(graphic.clone());
        Ok(())
    }

    fn draw_line(&mut self, graphic: &Graphic) -> Result<(), RenderError> {
        self.usable()?.graphics.push(graphic.clone());
        Ok(())
    }

    fn show_popup(&mut self, at: LatLng, popup: &Popup) -> Result<(), RenderError> {
        self.usable()?.popups.push((at, popup.clone()));
        Ok(())
    }

    fn add_control(&mut self, control: MapControl) -> Result<(), RenderError> {
        self.usable()?.controls.push(control);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        self.usable()?.flushes += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        let mut rec = self.lock();
        rec.destroyed = true;
        rec.graphics.clear();
    }
}

/// Writes the current graphics collection as a GeoJSON FeatureCollection on
/// every flush. The file is replaced atomically.
#[derive(Debug)]
pub struct GeoJsonSurface {
    path: PathBuf,
    graphics: Vec<Graphic>,
    controls: Vec<MapControl>,
    view: Option<MapView>,
    authenticated: bool,
    destroyed: bool,
}

impl GeoJsonSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            graphics: Vec::new(),
            controls: Vec::new(),
            view: None,
            authenticated: false,
            destroyed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        if !self.authenticated {
            return Err(RenderError::SurfaceUnavailable("surface not initialized".into()));
        }
        Ok(())
    }

    /// FeatureCollection for the current graphics.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self.graphics.iter().map(feature).collect();
        let legend = self.controls.iter().find_map(|c| match c {
            MapControl::Legend(entries) => Some(entries),
            MapControl::Zoom => None,
        });
        json!({
            "type": "FeatureCollection",
            "features": features,
            "view": self.view,
            "legend": legend,
        })
    }

    fn write(&self) -> Result<(), RenderError> {
        let unavailable = |e: std::io::Error| {
            RenderError::SurfaceUnavailable(format!("write {}: {e}", self.path.display()))
        };
        let body = serde_json::to_vec_pretty(&self.to_geojson())
            .map_err(|e| RenderError::SurfaceUnavailable(format!("serialize geojson: {e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let tmp = self.path.with_extension("geojson.tmp");
        std::fs::write(&tmp, body).map_err(unavailable)?;
        std::fs::rename(&tmp, &self.path).map_err(unavailable)?;
        debug!(path = %self.path.display(), features = self.graphics.len(), "wrote overlay");
        Ok(())
    }
}

impl MapSurface for GeoJsonSurface {
    fn initialize(&mut self, token: &str, view: &MapView) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        if token.is_empty() {
            return Err(RenderError::SurfaceUnavailable("empty access token".into()));
        }
        self.authenticated = true;
        self.view = Some(*view);
        self.graphics.clear();
        self.controls.clear();
        Ok(())
    }

    fn update_token(&mut self, token: &str) -> Result<(), RenderError> {
        self.check()?;
        if token.is_empty() {
            return Err(RenderError::SurfaceUnavailable("empty access token".into()));
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.check()?;
        self.graphics.clear();
        Ok(())
    }

    fn draw_point(&mut self, graphic: &Graphic) -> Result<(), RenderError> {
        self.check()?;
        self.graphics.push(graphic.clone());
        Ok(())
    }

    fn draw_line(&mut self, graphic: &Graphic) -> Result<(), RenderError> {
        self.check()?;
        self.graphics.push(graphic.clone());
        Ok(())
    }

    fn show_popup(&mut self, _at: LatLng, _popup: &Popup) -> Result<(), RenderError> {
        // Popups are embedded per feature; there is no interactive view.
        self.check()
    }

    fn add_control(&mut self, control: MapControl) -> Result<(), RenderError> {
        self.check()?;
        self.controls.push(control);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        self.check()?;
        self.write()
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.graphics.clear();
    }
}

fn feature(g: &Graphic) -> Value {
    let geometry = match &g.geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.lng, p.lat] }),
        Geometry::Line(pts) => json!({
            "type": "LineString",
            "coordinates": pts.iter().map(|p| [p.lng, p.lat]).collect::<Vec<_>>(),
        }),
    };
    let mut props = serde_json::Map::new();
    for (k, v) in &g.attributes {
        props.insert(k.clone(), Value::String(v.clone()));
    }
    props.insert("symbol".into(), serde_json::to_value(g.symbol).unwrap_or(Value::Null));
    if let Some(popup) = &g.popup {
        props.insert("popup".into(), Value::String(popup.to_text()));
    }
    json!({ "type": "Feature", "geometry": geometry, "properties": props })
}
