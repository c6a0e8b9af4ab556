use std::path::Path;
use std::sync::{Arc, LazyLock};

use log::debug;
use resvg::usvg::fontdb::Database;

/// Loading system fonts is slow, so the database is built once and shared by every parse.
static FONTDB: LazyLock<Arc<Database>> = LazyLock::new(|| {
    let mut fontdb = Database::new();
    fontdb.load_system_fonts();

    let local_fonts = Path::new("fonts");
    if local_fonts.is_dir() {
        fontdb.load_fonts_dir(local_fonts);
    }

    configure_font_fallbacks(&mut fontdb);
    debug!(faces = fontdb.len(); "Loaded font database");
    Arc::new(fontdb)
});

pub fn shared_fontdb() -> Arc<Database> {
    FONTDB.clone()
}

/// usvg options wired to the shared font database.
pub fn usvg_options() -> resvg::usvg::Options<'static> {
    resvg::usvg::Options {
        fontdb: shared_fontdb(),
        ..Default::default()
    }
}

fn configure_font_fallbacks(fontdb: &mut Database) {
    let mut sans_family: Option<String> = None;
    let mut serif_family: Option<String> = None;
    let mut mono_family: Option<String> = None;
    let mut first_family: Option<String> = None;

    for face in fontdb.faces() {
        for (family, _) in &face.families {
            if first_family.is_none() {
                first_family = Some(family.clone());
            }

            let lower = family.to_ascii_lowercase();
            if sans_family.is_none() && lower.contains("sans") {
                sans_family = Some(family.clone());
            }
            if serif_family.is_none() && lower.contains("serif") {
                serif_family = Some(family.clone());
            }
            if mono_family.is_none() && (lower.contains("mono") || lower.contains("code")) {
                mono_family = Some(family.clone());
            }
        }
    }

    if let Some(family) = sans_family.as_deref().or(first_family.as_deref()) {
        fontdb.set_sans_serif_family(family);
    }
    if let Some(family) = serif_family.as_deref().or(first_family.as_deref()) {
        fontdb.set_serif_family(family);
    }
    if let Some(family) = mono_family
        .as_deref()
        .or(sans_family.as_deref())
        .or(first_family.as_deref())
    {
        fontdb.set_monospace_family(family);
    }
}
