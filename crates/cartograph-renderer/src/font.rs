use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustybuzz::UnicodeBuffer;
use tiny_skia::{Path as SkPath, PathBuilder};
use ttf_parser::{name_id, Face, GlyphId, OutlineBuilder};

/// A loaded font face, addressed by `"Family Subfamily"` (e.g. `"DejaVu Sans Book"`).
#[derive(Debug, Clone)]
pub struct FontFace {
    pub family: String,
    pub subfamily: String,
    pub path: PathBuf,
    data: Arc<Vec<u8>>,
    index: u32,
}

impl FontFace {
    pub fn name(&self) -> String {
        format!("{} {}", self.family, self.subfamily)
    }
}

/// Shaped text: an outline path with its origin at the left end of the
/// baseline, plus its advance width and line metrics in pixels.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub path: Option<SkPath>,
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

/// Registry of font faces found in font directories.
#[derive(Debug, Default)]
pub struct FontEngine {
    faces: Vec<FontFace>,
}

impl FontEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every TrueType/OpenType face under `dir` (recursively).
    /// Returns the number of faces added.
    pub fn register_directory(&mut self, dir: &Path) -> usize {
        let mut added = 0;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot read font directory {}: {}", dir.display(), e);
                return 0;
            }
        };
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                added += self.register_directory(&path);
            } else if is_font_file(&path) {
                added += self.register_file(&path);
            }
        }
        added
    }

    /// Register all faces in a single font file.
    pub fn register_file(&mut self, path: &Path) -> usize {
        let data = match fs::read(path) {
            Ok(data) => Arc::new(data),
            Err(e) => {
                log::warn!("Cannot read font {}: {}", path.display(), e);
                return 0;
            }
        };
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        let mut added = 0;
        for index in 0..count {
            let face = match Face::parse(&data, index) {
                Ok(face) => face,
                Err(e) => {
                    log::warn!("Skipping font {} #{}: {}", path.display(), index, e);
                    continue;
                }
            };
            let family = face_name(&face, name_id::TYPOGRAPHIC_FAMILY)
                .or_else(|| face_name(&face, name_id::FAMILY))
                .unwrap_or_else(|| "Unknown".to_string());
            let subfamily = face_name(&face, name_id::TYPOGRAPHIC_SUBFAMILY)
                .or_else(|| face_name(&face, name_id::SUBFAMILY))
                .unwrap_or_else(|| "Regular".to_string());
            log::debug!("Registered font '{} {}' from {}", family, subfamily, path.display());
            self.faces.push(FontFace {
                family,
                subfamily,
                path: path.to_path_buf(),
                data: Arc::clone(&data),
                index,
            });
            added += 1;
        }
        added
    }

    pub fn face_names(&self) -> Vec<String> {
        self.faces.iter().map(FontFace::name).collect()
    }

    /// Find a face by its full name, ignoring case.
    pub fn resolve(&self, face_name: &str) -> Option<&FontFace> {
        self.faces
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(face_name.trim()))
    }

    /// Shape and lay out a single line of text at `size` pixels.
    pub fn layout(&self, face: &FontFace, text: &str, size: f32) -> Option<TextLayout> {
        let shaper = rustybuzz::Face::from_slice(&face.data, face.index)?;
        let scale = size / shaper.units_per_em() as f32;
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        let glyphs = rustybuzz::shape(&shaper, &[], buffer);

        let mut builder = GlyphPath {
            pb: PathBuilder::new(),
            scale,
            x: 0.0,
            y: 0.0,
        };
        let mut pen = 0.0;
        for (pos, info) in glyphs.glyph_positions().iter().zip(glyphs.glyph_infos()) {
            if info.glyph_id == 0 {
                log::debug!("No glyph for {:?} at byte {} in {}", text, info.cluster, face.name());
            }
            builder.x = pen + pos.x_offset as f32 * scale;
            builder.y = pos.y_offset as f32 * scale;
            shaper.outline_glyph(GlyphId(info.glyph_id as u16), &mut builder);
            pen += pos.x_advance as f32 * scale;
        }
        Some(TextLayout {
            width: pen,
            ascent: shaper.ascender() as f32 * scale,
            descent: -(shaper.descender() as f32) * scale,
            path: builder.pb.finish(),
        })
    }
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn face_name(face: &Face, id: u16) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|n| n.name_id == id)
        .find_map(|n| n.to_string())
}

/// Collects glyph outlines into one path, flipping font units (y up) into
/// screen space (y down). `x` and `y` place the current glyph's origin in
/// pixels, `y` pointing up.
struct GlyphPath {
    pb: PathBuilder,
    scale: f32,
    x: f32,
    y: f32,
}

impl GlyphPath {
    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x + x * self.scale, -(self.y + y * self.scale))
    }
}

impl OutlineBuilder for GlyphPath {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.pb.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.pb.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x, y) = self.pt(x, y);
        self.pb.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x2, y2) = self.pt(x2, y2);
        let (x, y) = self.pt(x, y);
        self.pb.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.pb.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_engine_resolves_nothing() {
        let engine = FontEngine::new();
        assert!(engine.face_names().is_empty());
        assert!(engine.resolve("DejaVu Sans Book").is_none());
    }

    #[test]
    fn test_register_skips_non_fonts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), "not a font").unwrap();
        fs::write(dir.path().join("broken.ttf"), b"\0\0\0\0garbage").unwrap();
        let mut engine = FontEngine::new();
        assert_eq!(engine.register_directory(dir.path()), 0);
        assert_eq!(engine.register_directory(&dir.path().join("missing")), 0);
        assert!(engine.face_names().is_empty());
    }

    fn dejavu() -> Option<FontEngine> {
        let mut engine = FontEngine::new();
        let path = Path::new("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf");
        (path.exists() && engine.register_file(path) > 0).then_some(engine)
    }

    #[test]
    fn test_layout_applies_kerning() {
        let Some(engine) = dejavu() else {
            eprintln!("DejaVuSans.ttf not installed, skipping");
            return;
        };
        let face = engine.resolve("DejaVu Sans Book").unwrap();
        let width = |text: &str| engine.layout(face, text, 20.0).unwrap().width;
        assert!(width("AV") < width("A") + width("V"));
        assert!(width("ab") > width("a"));

        let layout = engine.layout(face, "Rome", 20.0).unwrap();
        let bounds = layout.path.unwrap().bounds();
        assert!(bounds.top() < 0.0 && bounds.top() > -layout.ascent - 1.0);
        assert!(bounds.left() >= 0.0 && bounds.right() <= layout.width + 1.0);
        assert!(engine.layout(face, "", 20.0).unwrap().path.is_none());
    }

    #[test]
    fn test_font_file_extensions() {
        assert!(is_font_file(Path::new("DejaVuSans.TTF")));
        assert!(is_font_file(Path::new("a/b.otf")));
        assert!(!is_font_file(Path::new("a.woff2")));
    }
}
