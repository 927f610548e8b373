use crate::annotations::tools::Tool;
use crate::domain::ViewMode;
use crate::session::messages::Msg;
use crate::session::state::EditorSession;

/// Zoom step for the +/- keys
pub const KEY_ZOOM_STEP: f64 = 1.25;

/// Keys the editor reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Character(char),
}

/// Presets on the number keys
const PRESET_KEYS: [(char, ViewMode); 4] = [
    ('1', ViewMode::Original),
    ('2', ViewMode::Vegetation),
    ('3', ViewMode::Health),
    ('4', ViewMode::Detection),
];

pub fn handle_key_event(session: &EditorSession, key: Key) -> Option<Msg> {
    let has_draft = session.drawing.draft().is_some();

    match key {
        Key::Escape if has_draft => Some(Msg::cancel()),
        Key::Escape => None,
        // Tool shortcuts
        Key::Character('v') => Some(Msg::set_tool(Tool::Select)),
        Key::Character('p') => Some(Msg::set_tool(Tool::Point)),
        Key::Character('g') => Some(Msg::set_tool(Tool::Polygon)),
        Key::Character('m') => Some(Msg::set_tool(Tool::Measurement)),
        Key::Character('r') => Some(Msg::set_tool(Tool::Roi)),
        Key::Character('e') => Some(Msg::set_tool(Tool::Eraser)),
        // View shortcuts; the session ignores them mid-gesture
        Key::Character('+' | '=') => Some(Msg::zoom_centered(KEY_ZOOM_STEP)),
        Key::Character('-') => Some(Msg::zoom_centered(1.0 / KEY_ZOOM_STEP)),
        Key::Character('0') => Some(Msg::reset_view()),
        Key::Character(c) => PRESET_KEYS
            .iter()
            .find(|(k, _)| *k == c)
            .map(|(_, mode)| Msg::view_mode(*mode)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CropLensConfig;
    use crate::domain::ImageSize;
    use crate::session::messages::{DrawMsg, LayerMsg, ViewMsg};

    fn session() -> EditorSession {
        EditorSession::new(CropLensConfig::default(), ImageSize::new(100, 100))
    }

    #[test]
    fn tool_keys_select_tools() {
        let s = session();
        for (c, tool) in [
            ('v', Tool::Select),
            ('p', Tool::Point),
            ('g', Tool::Polygon),
            ('m', Tool::Measurement),
            ('r', Tool::Roi),
            ('e', Tool::Eraser),
        ] {
            let msg = handle_key_event(&s, Key::Character(c));
            assert!(matches!(msg, Some(Msg::Draw(DrawMsg::SetTool(t))) if t == tool));
        }
    }

    #[test]
    fn escape_only_cancels_an_open_draft() {
        let mut s = session();
        assert!(handle_key_event(&s, Key::Escape).is_none());
        s.drawing.set_tool(Tool::Measurement);
        s.drawing.handle_pointer(
            crate::annotations::tools::PointerEvent::Click(crate::domain::ViewportPoint::new(1.0, 1.0)),
            &s.view,
        );
        assert!(matches!(
            handle_key_event(&s, Key::Escape),
            Some(Msg::Draw(DrawMsg::Cancel))
        ));
    }

    #[test]
    fn view_keys() {
        let s = session();
        assert!(matches!(
            handle_key_event(&s, Key::Character('0')),
            Some(Msg::View(ViewMsg::Reset))
        ));
        assert!(matches!(
            handle_key_event(&s, Key::Character('-')),
            Some(Msg::View(ViewMsg::ZoomCentered(f))) if f < 1.0
        ));
        assert!(matches!(
            handle_key_event(&s, Key::Character('4')),
            Some(Msg::Layer(LayerMsg::ApplyViewMode(ViewMode::Detection)))
        ));
        assert!(handle_key_event(&s, Key::Character('x')).is_none());
    }
}
