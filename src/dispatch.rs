//! Executes matched voice actions against the host

use glam::Vec3;

use crate::host::{
    Host, HostError, ObjectMode, Primitive, RenderRequest, ReportLevel, SmartProject, ViewState,
};
use crate::vocabulary::Action;

/// How far a spoken "front"/"left"/"up" moves the view
pub const VIEW_STEP: f32 = 100.0;

/// Run one action; failures are logged and reported, never propagated
pub fn execute(host: &mut dyn Host, action: Action) -> bool {
    tracing::info!(%action, "executing voice command");

    match try_execute(host, action) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%action, error = %e, "voice command failed");
            host.report(ReportLevel::Warning, &format!("{}: {}", action, e));
            false
        }
    }
}

fn try_execute(host: &mut dyn Host, action: Action) -> Result<(), HostError> {
    match action {
        Action::Cube => add(host, Primitive::Cube),
        Action::Sphere => add(host, Primitive::UvSphere),
        Action::Cylinder => add(host, Primitive::default_cylinder()),
        Action::Front => nudge_view(host, Vec3::X * VIEW_STEP),
        Action::Back => nudge_view(host, Vec3::X * -VIEW_STEP),
        Action::Left => nudge_view(host, Vec3::Y * VIEW_STEP),
        Action::Right => nudge_view(host, Vec3::Y * -VIEW_STEP),
        Action::Up => nudge_view(host, Vec3::Z * VIEW_STEP),
        Action::Down => nudge_view(host, Vec3::Z * -VIEW_STEP),
        Action::Render => {
            host.render(RenderRequest::default())?;
            host.report(ReportLevel::Info, "render requested");
            Ok(())
        }
        Action::Texture => unwrap_active_mesh(host),
    }
}

fn add(host: &mut dyn Host, primitive: Primitive) -> Result<(), HostError> {
    let name = host.add_primitive(primitive)?;
    tracing::debug!(object = %name, "primitive added");
    Ok(())
}

fn nudge_view(host: &mut dyn Host, offset: Vec3) -> Result<(), HostError> {
    if !host.has_viewport() {
        return Err(HostError::Unavailable("no 3D viewport".into()));
    }
    let view = host.view();
    host.set_view(ViewState {
        location: view.location + offset,
        ..view
    });
    host.tag_redraw();
    Ok(())
}

/// Smart UV project the active mesh, leaving it selected in object mode
fn unwrap_active_mesh(host: &mut dyn Host) -> Result<(), HostError> {
    let active = host.active_object().ok_or(HostError::NoActiveObject)?;
    if !active.is_mesh {
        return Err(HostError::NotAMesh(active.name));
    }

    host.set_object_mode(ObjectMode::Object)?;
    host.select_only(&active.name)?;
    host.set_object_mode(ObjectMode::Edit)?;
    let projected = host.uv_smart_project(SmartProject::default());
    // leave edit mode even when the projection failed
    host.set_object_mode(ObjectMode::Object)?;
    projected
}

/// Move the view back to the world origin, keeping its orientation
pub fn reset_view(host: &mut dyn Host) -> bool {
    if !host.has_viewport() {
        host.report(ReportLevel::Error, "no 3D viewport found");
        return false;
    }
    let view = host.view();
    host.set_view(ViewState {
        location: Vec3::ZERO,
        ..view
    });
    host.tag_redraw();
    host.report(ReportLevel::Info, "viewport reset to (0, 0, 0)");
    true
}

/// Switch object/edit/sculpt mode; needs an active object
pub fn set_object_mode(host: &mut dyn Host, mode: ObjectMode) -> bool {
    if host.active_object().is_none() {
        host.report(ReportLevel::Warning, "select an object first");
        return false;
    }
    match host.set_object_mode(mode) {
        Ok(()) => {
            host.report(ReportLevel::Info, &format!("mode changed to {}", mode));
            true
        }
        Err(e) => {
            host.report(ReportLevel::Error, &format!("could not change mode: {}", e));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHost;

    #[test]
    fn test_primitives() {
        let mut host = SimHost::new();
        assert!(execute(&mut host, Action::Cube));
        assert!(execute(&mut host, Action::Sphere));
        assert!(execute(&mut host, Action::Cylinder));
        assert_eq!(host.object_names(), vec!["Cube", "Cube.001", "Sphere", "Cylinder"]);
    }

    #[test]
    fn test_view_nudges() {
        let mut host = SimHost::new();
        let start = host.view().location;
        execute(&mut host, Action::Front);
        execute(&mut host, Action::Left);
        execute(&mut host, Action::Left);
        execute(&mut host, Action::Down);
        let end = host.view().location;
        assert_eq!(end - start, Vec3::new(100.0, 200.0, -100.0));
        execute(&mut host, Action::Back);
        execute(&mut host, Action::Right);
        execute(&mut host, Action::Up);
        assert_eq!(host.view().location - start, Vec3::new(0.0, 100.0, 0.0));
    }

    #[test]
    fn test_render_is_deferred_png() {
        let mut host = SimHost::new();
        assert!(execute(&mut host, Action::Render));
        let request = &host.renders()[0];
        assert_eq!(request.filepath, "//renders/render_");
        assert_eq!(request.delay.as_millis(), 500);
    }

    #[test]
    fn test_texture_unwraps_and_returns_to_object_mode() {
        let mut host = SimHost::new();
        assert!(execute(&mut host, Action::Texture));
        assert_eq!(host.uv_projections("Cube"), 1);
        assert_eq!(host.object_mode(), ObjectMode::Object);
        assert_eq!(host.selected(), vec!["Cube"]);
    }

    #[test]
    fn test_texture_without_mesh_fails_cleanly() {
        let mut host = SimHost::new();
        host.insert_object("Lamp", Vec3::ZERO, false);
        assert!(!execute(&mut host, Action::Texture));
        assert_eq!(host.last_report().map(|(l, _)| *l), Some(ReportLevel::Warning));
        host.clear_active();
        assert!(!execute(&mut host, Action::Texture));
    }

    #[test]
    fn test_reset_view_keeps_rotation() {
        let mut host = SimHost::new();
        let rotation = host.view().rotation;
        assert!(reset_view(&mut host));
        assert_eq!(host.view().location, Vec3::ZERO);
        assert_eq!(host.view().rotation, rotation);

        host.set_viewport(false);
        assert!(!reset_view(&mut host));
    }

    #[test]
    fn test_object_mode_needs_active_object() {
        let mut host = SimHost::new();
        assert!(set_object_mode(&mut host, ObjectMode::Sculpt));
        assert_eq!(host.object_mode(), ObjectMode::Sculpt);
        host.clear_active();
        assert!(!set_object_mode(&mut host, ObjectMode::Object));
        assert_eq!(host.object_mode(), ObjectMode::Sculpt);
    }
}
