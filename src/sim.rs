//! In-memory stand-in for the 3D host
//!
//! Keeps a viewport camera and a flat list of objects, and records every
//! side effect so the binary can print them and tests can assert on them.

use glam::Vec3;
use std::collections::HashMap;

use crate::host::{
    ActiveObject, Host, HostError, ObjectMode, Primitive, RenderRequest, ReportLevel,
    SmartProject, Transform, ViewState,
};
use crate::menu::RadialMenu;

#[derive(Debug, Clone)]
struct SimObject {
    name: String,
    transform: Transform,
    is_mesh: bool,
    keyframes: usize,
    uv_projections: usize,
}

#[derive(Debug)]
pub struct SimHost {
    viewport: bool,
    view: ViewState,
    objects: Vec<SimObject>,
    active: Option<usize>,
    selected: Vec<usize>,
    mode: ObjectMode,
    redraws: u64,
    menus: Vec<ObjectMode>,
    renders: Vec<RenderRequest>,
    reports: Vec<(ReportLevel, String)>,
    name_counters: HashMap<&'static str, usize>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// A scene with a viewport and a single "Cube" mesh at the origin
    pub fn new() -> Self {
        let mut host = Self {
            viewport: true,
            view: ViewState::default(),
            objects: Vec::new(),
            active: None,
            selected: Vec::new(),
            mode: ObjectMode::Object,
            redraws: 0,
            menus: Vec::new(),
            renders: Vec::new(),
            reports: Vec::new(),
            name_counters: HashMap::new(),
        };
        host.insert_object("Cube", Vec3::ZERO, true);
        host
    }

    pub fn set_viewport(&mut self, present: bool) {
        self.viewport = present;
    }

    /// Add a non-primitive object, e.g. a camera or an empty
    pub fn insert_object(&mut self, name: &str, location: Vec3, is_mesh: bool) {
        self.objects.push(SimObject {
            name: name.to_string(),
            transform: Transform {
                location,
                rotation: Vec3::ZERO,
            },
            is_mesh,
            keyframes: 0,
            uv_projections: 0,
        });
        self.active = Some(self.objects.len() - 1);
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    pub fn object_names(&self) -> Vec<&str> {
        self.objects.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn keyframes(&self, name: &str) -> usize {
        self.find(name).map(|i| self.objects[i].keyframes).unwrap_or(0)
    }

    pub fn uv_projections(&self, name: &str) -> usize {
        self.find(name)
            .map(|i| self.objects[i].uv_projections)
            .unwrap_or(0)
    }

    pub fn selected(&self) -> Vec<&str> {
        self.selected
            .iter()
            .map(|&i| self.objects[i].name.as_str())
            .collect()
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn menus_shown(&self) -> &[ObjectMode] {
        &self.menus
    }

    pub fn renders(&self) -> &[RenderRequest] {
        &self.renders
    }

    pub fn reports(&self) -> &[(ReportLevel, String)] {
        &self.reports
    }

    pub fn last_report(&self) -> Option<&(ReportLevel, String)> {
        self.reports.last()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name == name)
    }

    fn require(&self, name: &str) -> Result<usize, HostError> {
        self.find(name)
            .ok_or_else(|| HostError::NoSuchObject(name.to_string()))
    }

    /// Cube, Cube.001, Cube.002, ...
    fn unique_name(&mut self, base: &'static str) -> String {
        if self.find(base).is_none() {
            return base.to_string();
        }
        let counter = self.name_counters.entry(base).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}.{:03}", base, counter);
            if !self.objects.iter().any(|o| o.name == candidate) {
                return candidate;
            }
        }
    }
}

impl Host for SimHost {
    fn has_viewport(&self) -> bool {
        self.viewport
    }

    fn view(&self) -> ViewState {
        self.view
    }

    fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    fn object_transform(&self, name: &str) -> Option<Transform> {
        self.find(name).map(|i| self.objects[i].transform)
    }

    fn set_object_rotation(&mut self, name: &str, rotation: Vec3) -> Result<(), HostError> {
        let i = self.require(name)?;
        self.objects[i].transform.rotation = rotation;
        Ok(())
    }

    fn insert_rotation_keyframe(&mut self, name: &str) -> Result<(), HostError> {
        let i = self.require(name)?;
        self.objects[i].keyframes += 1;
        Ok(())
    }

    fn add_primitive(&mut self, primitive: Primitive) -> Result<String, HostError> {
        if self.mode != ObjectMode::Object {
            return Err(HostError::Unavailable(format!(
                "cannot add objects in {} mode",
                self.mode
            )));
        }
        let location = match primitive {
            Primitive::Cylinder { location, .. } => location,
            _ => Vec3::ZERO,
        };
        let name = self.unique_name(primitive.base_name());
        self.insert_object(&name, location, true);
        tracing::debug!(object = %name, ?primitive, "sim: primitive added");
        Ok(name)
    }

    fn object_mode(&self) -> ObjectMode {
        self.mode
    }

    fn set_object_mode(&mut self, mode: ObjectMode) -> Result<(), HostError> {
        let Some(active) = self.active else {
            return Err(HostError::NoActiveObject);
        };
        if mode != ObjectMode::Object && !self.objects[active].is_mesh {
            return Err(HostError::NotAMesh(self.objects[active].name.clone()));
        }
        self.mode = mode;
        Ok(())
    }

    fn active_object(&self) -> Option<ActiveObject> {
        self.active.map(|i| ActiveObject {
            name: self.objects[i].name.clone(),
            is_mesh: self.objects[i].is_mesh,
        })
    }

    fn select_only(&mut self, name: &str) -> Result<(), HostError> {
        let i = self.require(name)?;
        self.selected = vec![i];
        self.active = Some(i);
        Ok(())
    }

    fn uv_smart_project(&mut self, params: SmartProject) -> Result<(), HostError> {
        if self.mode != ObjectMode::Edit {
            return Err(HostError::Unavailable("uv projection needs edit mode".into()));
        }
        let i = self.active.ok_or(HostError::NoActiveObject)?;
        self.objects[i].uv_projections += 1;
        tracing::debug!(object = %self.objects[i].name, ?params, "sim: smart uv project");
        Ok(())
    }

    fn render(&mut self, request: RenderRequest) -> Result<(), HostError> {
        tracing::debug!(filepath = %request.filepath, "sim: render scheduled");
        self.renders.push(request);
        Ok(())
    }

    fn show_radial_menu(&mut self, menu: &RadialMenu) {
        tracing::info!(title = menu.title(), items = menu.items.len(), "radial menu");
        self.menus.push(menu.mode);
    }

    fn tag_redraw(&mut self) {
        self.redraws += 1;
    }

    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Info => tracing::info!("{}", message),
            ReportLevel::Warning => tracing::warn!("{}", message),
            ReportLevel::Error => tracing::error!("{}", message),
        }
        self.reports.push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names_are_unique() {
        let mut host = SimHost::new();
        assert_eq!(host.add_primitive(Primitive::Cube).unwrap(), "Cube.001");
        assert_eq!(host.add_primitive(Primitive::Cube).unwrap(), "Cube.002");
        assert_eq!(host.add_primitive(Primitive::UvSphere).unwrap(), "Sphere");
        assert_eq!(host.active_object().unwrap().name, "Sphere");
    }

    #[test]
    fn test_mode_requires_active_mesh() {
        let mut host = SimHost::new();
        host.insert_object("Camera", Vec3::ZERO, false);
        assert!(matches!(
            host.set_object_mode(ObjectMode::Edit),
            Err(HostError::NotAMesh(_))
        ));
        host.clear_active();
        assert!(matches!(
            host.set_object_mode(ObjectMode::Object),
            Err(HostError::NoActiveObject)
        ));
    }
}
