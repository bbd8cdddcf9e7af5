//! Radial (pie) menus opened by the joystick button
//!
//! One layout per object mode. Each item names the host operator it runs
//! and, where the operator takes one, its argument.

use crate::host::ObjectMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub label: &'static str,
    pub operator: &'static str,
    pub argument: Option<&'static str>,
}

const fn item(label: &'static str, operator: &'static str) -> MenuItem {
    MenuItem {
        label,
        operator,
        argument: None,
    }
}

const fn item_with(
    label: &'static str,
    operator: &'static str,
    argument: &'static str,
) -> MenuItem {
    MenuItem {
        label,
        operator,
        argument: Some(argument),
    }
}

const EDIT_ITEMS: [MenuItem; 8] = [
    item("Extrudar (E)", "mesh.extrude_region_move"),
    item("Criar Face (F)", "mesh.edge_face_add"),
    item("Excluir (X)", "mesh.delete"),
    item("Mover (G)", "transform.translate"),
    item_with("Adicionar (Shift+A)", "wm.call_menu", "VIEW3D_MT_add"),
    item("Escalar (S)", "transform.resize"),
    item_with("Selecionar Tudo (A)", "mesh.select_all", "SELECT"),
    item("Corte em Loop (Ctrl+R)", "mesh.loopcut_slide"),
];

const OBJECT_ITEMS: [MenuItem; 8] = [
    item("Mover (G)", "transform.translate"),
    item("Duplicar (Shift+D)", "object.duplicate_move"),
    item("Excluir (X)", "object.delete"),
    item_with("Adicionar (Shift+A)", "wm.call_menu", "VIEW3D_MT_add"),
    item("Escalar (S)", "transform.resize"),
    item_with("Definir Origem", "object.origin_set", "ORIGIN_CENTER_OF_MASS"),
    item("Sombrear Suave", "object.shade_smooth"),
    item("Desfazer (Ctrl+Z)", "ed.undo"),
];

const SCULPT_ITEMS: [MenuItem; 8] = [
    item_with("Esculpir (Draw)", "sculpt.brush_set", "DRAW"),
    item_with("Suavizar (Smooth)", "sculpt.brush_set", "SMOOTH"),
    item_with("Inflar (Inflate)", "sculpt.brush_set", "INFLATE"),
    item_with("Esmagar (Flatten)", "sculpt.brush_set", "FLATTEN"),
    item_with("Garrar (Grab)", "sculpt.brush_set", "GRAB"),
    item_with("Camadas (Layer)", "sculpt.brush_set", "LAYER"),
    item_with("Preencher (Fill)", "sculpt.brush_set", "FILL"),
    item("Desfazer (Ctrl+Z)", "ed.undo"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadialMenu {
    pub mode: ObjectMode,
    pub items: &'static [MenuItem],
}

impl RadialMenu {
    pub fn for_mode(mode: ObjectMode) -> Self {
        let items: &'static [MenuItem] = match mode {
            ObjectMode::Object => &OBJECT_ITEMS,
            ObjectMode::Edit => &EDIT_ITEMS,
            ObjectMode::Sculpt => &SCULPT_ITEMS,
        };
        Self { mode, items }
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            ObjectMode::Object => "Modo Objeto",
            ObjectMode::Edit => "Modo Edição",
            ObjectMode::Sculpt => "Modo Escultura",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_a_full_pie() {
        for mode in [ObjectMode::Object, ObjectMode::Edit, ObjectMode::Sculpt] {
            let menu = RadialMenu::for_mode(mode);
            assert_eq!(menu.items.len(), 8);
            assert_eq!(menu.mode, mode);
        }
    }

    #[test]
    fn test_sculpt_menu_sets_brushes() {
        let menu = RadialMenu::for_mode(ObjectMode::Sculpt);
        assert_eq!(menu.items[0].argument, Some("DRAW"));
        assert_eq!(menu.items[7].operator, "ed.undo");
    }
}
