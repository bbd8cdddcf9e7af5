//! Command surface of the 3D host application
//!
//! Everything the navigator and the dispatcher do to the scene goes through
//! [`Host`]. The scene graph itself lives on the other side of this trait.

use glam::{Quat, Vec3};
use std::fmt;
use std::time::Duration;

use crate::menu::RadialMenu;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no object named {0:?}")]
    NoSuchObject(String),

    #[error("no active object")]
    NoActiveObject,

    #[error("active object {0:?} is not a mesh")]
    NotAMesh(String),

    #[error("operation not available: {0}")]
    Unavailable(String),
}

/// Viewport camera: where it is and how it is oriented
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub location: Vec3,
    pub rotation: Quat,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            location: Vec3::new(0.0, -10.0, 5.0),
            rotation: Quat::IDENTITY,
        }
    }
}

/// Object transform as the host exposes it (Euler rotation in radians)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub location: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Cube,
    UvSphere,
    Cylinder {
        radius: f32,
        depth: f32,
        location: Vec3,
    },
}

impl Primitive {
    pub fn default_cylinder() -> Self {
        Primitive::Cylinder {
            radius: 1.0,
            depth: 2.0,
            location: Vec3::ZERO,
        }
    }

    pub fn base_name(&self) -> &'static str {
        match self {
            Primitive::Cube => "Cube",
            Primitive::UvSphere => "Sphere",
            Primitive::Cylinder { .. } => "Cylinder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectMode {
    #[default]
    Object,
    Edit,
    Sculpt,
}

impl ObjectMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "object" => Some(ObjectMode::Object),
            "edit" => Some(ObjectMode::Edit),
            "sculpt" => Some(ObjectMode::Sculpt),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectMode::Object => "object",
            ObjectMode::Edit => "edit",
            ObjectMode::Sculpt => "sculpt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveObject {
    pub name: String,
    pub is_mesh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartProject {
    pub angle_limit_deg: f32,
    pub island_margin: f32,
}

impl Default for SmartProject {
    fn default() -> Self {
        Self {
            angle_limit_deg: 66.0,
            island_margin: 0.03,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub format: ImageFormat,
    /// Host-relative output prefix
    pub filepath: String,
    /// The host runs the render after this delay, off the caller's stack
    pub delay: Duration,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            filepath: "//renders/render_".into(),
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// Host application seen from the controller
///
/// All methods run on the host's main thread.
pub trait Host {
    fn has_viewport(&self) -> bool;

    fn view(&self) -> ViewState;
    fn set_view(&mut self, view: ViewState);

    fn object_transform(&self, name: &str) -> Option<Transform>;
    fn set_object_rotation(&mut self, name: &str, rotation: Vec3) -> Result<(), HostError>;
    fn insert_rotation_keyframe(&mut self, name: &str) -> Result<(), HostError>;

    /// Add a primitive at the 3D cursor; returns the new object's name
    fn add_primitive(&mut self, primitive: Primitive) -> Result<String, HostError>;

    fn object_mode(&self) -> ObjectMode;
    fn set_object_mode(&mut self, mode: ObjectMode) -> Result<(), HostError>;
    fn active_object(&self) -> Option<ActiveObject>;
    fn select_only(&mut self, name: &str) -> Result<(), HostError>;
    fn uv_smart_project(&mut self, params: SmartProject) -> Result<(), HostError>;

    fn render(&mut self, request: RenderRequest) -> Result<(), HostError>;

    fn show_radial_menu(&mut self, menu: &RadialMenu);
    fn tag_redraw(&mut self);

    /// Operator-facing message
    fn report(&mut self, level: ReportLevel, message: &str);
}
