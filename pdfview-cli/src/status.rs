use pdfview_core::{PageLayout, SessionState};

/// Terminal cell size assumed when the terminal does not report pixels.
const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

pub fn format_status(state: &SessionState) -> String {
    let Some(doc) = &state.document else {
        return if state.is_dragging {
            "release to open".to_string()
        } else {
            "no document".to_string()
        };
    };

    let mut parts = vec![doc.name.clone()];
    if state.is_encrypted {
        parts.push("locked".to_string());
    } else {
        parts.push(format!("page {}/{}", state.current_page, state.total_pages));
        parts.push(format!("{:.0}%", state.scale * 100.0));
    }
    if state.rotation.degrees() != 0 {
        parts.push(format!("{}°", state.rotation.degrees()));
    }
    if state.page_layout == PageLayout::Double {
        parts.push("double".to_string());
    }
    if state.dark_mode {
        parts.push("dark".to_string());
    }
    if !state.text_layer_enabled {
        parts.push("no text".to_string());
    }
    if !state.bookmarks.is_empty() {
        parts.push(counted(state.bookmarks.len(), "bookmark"));
    }
    let here = state.notes_for_page(state.current_page).len()
        + state.annotations_for_page(state.current_page).count();
    if here > 0 {
        parts.push(format!("{} here", counted(here, "note")));
    }
    if !state.search_text.is_empty() {
        parts.push(format!("/{}", state.search_text));
    }
    parts.join(" | ")
}

fn counted(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

pub fn combine_status(base: String, pending_input: Option<&str>, notice: Option<&str>) -> String {
    let mut status = base;
    for extra in [notice, pending_input].into_iter().flatten() {
        if !extra.is_empty() {
            status.push_str(" | ");
            status.push_str(extra);
        }
    }
    status
}

/// Cells needed to show an image of `image_px` pixels at its natural size,
/// shrunk to fit `available` cells while keeping the aspect ratio.
pub fn fit_to_cells(image_px: (u32, u32), cell_px: (f32, f32), available: (u32, u32)) -> (u32, u32) {
    let (cell_w, cell_h) = if cell_px.0 > 0.0 && cell_px.1 > 0.0 {
        cell_px
    } else {
        FALLBACK_CELL
    };
    let natural_cols = image_px.0 as f32 / cell_w;
    let natural_rows = image_px.1 as f32 / cell_h;
    if natural_cols <= 0.0 || natural_rows <= 0.0 {
        return (1, 1);
    }
    let shrink = (available.0 as f32 / natural_cols)
        .min(available.1 as f32 / natural_rows)
        .min(1.0);
    let cols = (natural_cols * shrink).round().clamp(1.0, available.0.max(1) as f32);
    let rows = (natural_rows * shrink).round().clamp(1.0, available.1.max(1) as f32);
    (cols as u32, rows as u32)
}
