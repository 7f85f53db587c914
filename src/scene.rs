//! Scene inspector: `getSceneState` and `getImageDefinition`.
//!
//! Resolving a displayable to a source file means walking its nested
//! components recursively, and, for layered images, unpacking the
//! attribute-selected sub-layers. Locating the declaration site for an
//! image, screen, or layered-image attribute falls back to scanning `.rpy`
//! sources with regexes when no structured index is available.

use crate::coordinator::ShowProvenance;
use crate::host::{AudioState, Displayable, HostContext, LayeredImage, LayeredLayer, ScreenEntry, ShownImage};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Longest chain of nested displayables walked before giving up (guards
/// against a cyclic `nested()` implementation).
const MAX_DISPLAYABLE_DEPTH: u32 = 10;

/// Where a show/scene/screen statement bound the entry, as echoed back in a
/// scene snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowStatementRef {
    /// Source file.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl From<ShowProvenance> for ShowStatementRef {
    fn from(p: ShowProvenance) -> Self {
        Self { file: p.file, line: p.line }
    }
}

/// One resolved sub-layer of a layered image, as reported inside a layered
/// [`ImageSnapshot`]'s `components`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSnapshot {
    /// The attribute gating this component, if any (`None` for `Always`).
    pub attribute: Option<String>,
    /// The attribute's declared group, if any.
    pub group: Option<String>,
    /// Backing file, if one could be found.
    pub file: Option<String>,
    /// Where this component's attribute is declared, if found.
    pub definition: Option<SourceLocation>,
}

/// One image currently shown on a layer, as reported by `getSceneState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSnapshot {
    /// Image tag.
    pub tag: String,
    /// Scene layer.
    pub layer: String,
    /// Attributes currently applied.
    pub attributes: Vec<String>,
    /// Backing file, if one could be found (non-layered images only).
    pub file: Option<String>,
    /// Human label of the `at` transforms applied (e.g. `"left, delayed"`).
    pub position: Option<String>,
    /// Where this image/its `layeredimage` block is declared, if found.
    pub definition: Option<SourceLocation>,
    /// Where the show/scene statement that bound this tag executed.
    pub show_statement: Option<ShowStatementRef>,
    /// `"show"` or `"scene"`, mirroring `show_statement`'s provenance.
    pub statement_type: Option<&'static str>,
    /// Whether this is a layered (attribute-composited) image.
    pub is_layered: bool,
    /// Active sub-layer components, populated only when `is_layered`.
    pub components: Vec<ComponentSnapshot>,
}

/// One layer's worth of shown images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSnapshot {
    /// Layer name (`master`, `screens`, `overlay`, …).
    pub layer: String,
    /// Images on this layer, in z-order.
    pub images: Vec<ImageSnapshot>,
}

/// A displayed screen, as reported by `getSceneState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSnapshot {
    /// Screen name.
    pub name: String,
    /// Layer the screen is displayed on.
    pub layer: String,
    /// Where `screen name(...):` is declared, if found.
    pub definition: Option<SourceLocation>,
    /// Where the `show screen`/`call screen` statement executed.
    pub show_statement: Option<ShowStatementRef>,
}

/// The full `getSceneState` response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneState {
    /// The label execution is currently inside, if known.
    pub current_label: Option<String>,
    /// Current line within that label's file.
    pub current_line: Option<u32>,
    /// Who is currently speaking, if anyone.
    pub current_speaker: Option<String>,
    /// Per-layer scene contents.
    pub layers: Vec<LayerSnapshot>,
    /// Screens currently shown.
    pub screens: Vec<ScreenSnapshot>,
    /// Currently playing audio.
    pub audio: AudioState,
}

/// A human label for the `at` transforms applied to a tag, e.g.
/// `"left, delayed"`. `None` if no transform was applied.
#[must_use]
pub fn position_label(at_list: &[String]) -> Option<String> {
    if at_list.is_empty() {
        None
    } else {
        Some(at_list.join(", "))
    }
}

/// Build a `getSceneState` snapshot from the host's current context,
/// consulting the coordinator's tracked show-map and scanning game sources
/// for declaration sites.
#[must_use]
pub fn scene_state(
    context: &HostContext,
    current_label: Option<String>,
    current_line: Option<u32>,
    game_base: &Path,
    commondir: Option<&Path>,
    tracked_image: impl Fn(&str, &str) -> Option<ShowProvenance>,
    tracked_screen: impl Fn(&str) -> Option<ShowProvenance>,
) -> SceneState {
    let layers = context
        .scene_lists
        .iter()
        .map(|(layer, entries)| LayerSnapshot {
            layer: layer.clone(),
            images: entries
                .iter()
                .map(|entry| build_image_snapshot(entry, layer, game_base, &tracked_image))
                .collect(),
        })
        .collect();

    let screens = context
        .screens
        .iter()
        .map(|screen| ScreenSnapshot {
            name: screen.name.clone(),
            layer: screen.layer.clone(),
            definition: find_screen_definition(game_base, commondir, &screen.name),
            show_statement: tracked_screen(&screen.name).map(ShowStatementRef::from),
        })
        .collect();

    SceneState {
        current_label,
        current_line,
        current_speaker: context.current_speaker.clone(),
        layers,
        screens,
        audio: context.audio.clone(),
    }
}

fn build_image_snapshot(
    entry: &crate::host::SceneEntry,
    layer: &str,
    game_base: &Path,
    tracked_image: &impl Fn(&str, &str) -> Option<ShowProvenance>,
) -> ImageSnapshot {
    let provenance = tracked_image(layer, &entry.tag);
    let show_statement = provenance.clone().map(ShowStatementRef::from);
    let statement_type = provenance.and_then(|p| p.statement_type);

    match &entry.displayable {
        ShownImage::Plain(displayable) => ImageSnapshot {
            tag: entry.tag.clone(),
            layer: layer.to_string(),
            attributes: entry.attributes.clone(),
            file: extract_file(displayable.as_ref(), 0),
            position: position_label(&entry.at_list),
            definition: find_image_definition(game_base, &entry.tag, &entry.attributes),
            show_statement,
            statement_type,
            is_layered: false,
            components: Vec::new(),
        },
        ShownImage::Layered(layered) => {
            let applied: HashSet<String> = entry.attributes.iter().cloned().collect();
            let resolved = layered_image_components(layered.as_ref(), &applied);
            let components = resolved
                .components
                .into_iter()
                .filter(|c| c.active)
                .map(|c| {
                    let definition = c
                        .attribute
                        .as_deref()
                        .and_then(|attr| find_layeredimage_attribute(game_base, &entry.tag, attr));
                    ComponentSnapshot {
                        attribute: c.attribute,
                        group: c.group,
                        file: c.file,
                        definition,
                    }
                })
                .collect();
            ImageSnapshot {
                tag: entry.tag.clone(),
                layer: layer.to_string(),
                attributes: entry.attributes.clone(),
                file: resolved.parent_file,
                position: position_label(&entry.at_list),
                definition: find_image_definition(game_base, &entry.tag, &[]),
                show_statement,
                statement_type,
                is_layered: true,
                components,
            }
        }
    }
}

fn extract_file(displayable: &dyn Displayable, depth: u32) -> Option<String> {
    if let Some(file) = displayable.filename() {
        return Some(file.to_string());
    }
    if depth >= MAX_DISPLAYABLE_DEPTH {
        return None;
    }
    displayable.nested().iter().find_map(|child| extract_file(child.as_ref(), depth + 1))
}

/// One sub-layer of a layered image, resolved to a file and active/banned
/// state, as reported by `getImageDefinition` for layered-image tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredComponent {
    /// The attribute gating this component, if it isn't `Always`.
    pub attribute: Option<String>,
    /// The attribute's declared group, if any.
    pub group: Option<String>,
    /// Backing file, if one could be found.
    pub file: Option<String>,
    /// Whether this component is active given the currently-applied set.
    pub active: bool,
}

/// A layered image broken into its resolved components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredImageSnapshot {
    /// The `Always` component's file, if the image declares one.
    pub parent_file: Option<String>,
    /// Attribute-gated components, in declaration order.
    pub components: Vec<LayeredComponent>,
}

/// Resolve a [`LayeredImage`] into its components given the currently
/// applied attribute set. Attributes the image declares as default are
/// folded into the applied set first (minus whatever the currently-applied
/// attributes ban), so a layered image shown with no explicit attributes
/// still shows its declared defaults.
#[must_use]
pub fn layered_image_components(image: &dyn LayeredImage, applied: &HashSet<String>) -> LayeredImageSnapshot {
    let banned = image.banned(applied);
    let mut effective = applied.clone();
    for decl in image.attributes() {
        if decl.default && !banned.contains(&decl.attribute) {
            effective.insert(decl.attribute);
        }
    }

    let mut parent_file = None;
    let mut components = Vec::new();

    for layer in image.layers() {
        match layer {
            LayeredLayer::Always { image: displayable } => {
                parent_file = displayable.and_then(|d| extract_file(d.as_ref(), 0));
            }
            LayeredLayer::Attribute { attribute, group, image: displayable } => {
                let active = effective.contains(&attribute) && !banned.contains(&attribute);
                components.push(LayeredComponent {
                    attribute: Some(attribute),
                    group,
                    file: displayable.and_then(|d| extract_file(d.as_ref(), 0)),
                    active,
                });
            }
            LayeredLayer::Condition | LayeredLayer::ConditionGroup => {}
        }
    }

    LayeredImageSnapshot { parent_file, components }
}

/// A location found while scanning `.rpy` source for a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Absolute file path.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
}

fn rpy_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    collect_rpy_files(root, &mut out);
    out
}

fn collect_rpy_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rpy_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rpy") {
            out.push(path);
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn scan_for_location(roots: &[&Path], pattern: &Regex) -> Option<SourceLocation> {
    for root in roots {
        for file in rpy_files(root) {
            let Ok(text) = fs::read_to_string(&file) else {
                continue;
            };
            for (index, line) in text.lines().enumerate() {
                if pattern.is_match(line) {
                    return Some(SourceLocation {
                        file,
                        #[allow(clippy::cast_possible_truncation)]
                        line: (index + 1) as u32,
                    });
                }
            }
        }
    }
    None
}

/// Find where an `image tag ...` or `layeredimage tag:` statement declares
/// `tag`, preferring the most specific attribute combination that matches.
#[must_use]
pub fn find_image_definition(game_base: &Path, tag: &str, attrs: &[String]) -> Option<SourceLocation> {
    let escaped_tag = regex::escape(tag);

    if !attrs.is_empty() {
        let escaped_attrs: Vec<String> = attrs.iter().map(|a| regex::escape(a)).collect();
        let with_attrs = Regex::new(&format!(
            r"^\s*image\s+{escaped_tag}\s+{}\s*=",
            escaped_attrs.join(r"\s+")
        ))
        .ok()?;
        if let Some(loc) = scan_for_location(&[game_base], &with_attrs) {
            return Some(loc);
        }
    }

    let bare = Regex::new(&format!(r"^\s*image\s+{escaped_tag}\s*=")).ok()?;
    if let Some(loc) = scan_for_location(&[game_base], &bare) {
        return Some(loc);
    }

    let layered = Regex::new(&format!(r"^\s*layeredimage\s+{escaped_tag}\s*:")).ok()?;
    scan_for_location(&[game_base], &layered)
}

/// Find where `screen name(...)` or `screen name:` defines `name`, checking
/// `game_base` before `commondir`.
#[must_use]
pub fn find_screen_definition(game_base: &Path, commondir: Option<&Path>, name: &str) -> Option<SourceLocation> {
    let escaped = regex::escape(name);
    let pattern = Regex::new(&format!(r"^\s*screen\s+{escaped}\s*[(:]")).ok()?;
    let roots: Vec<&Path> = match commondir {
        Some(dir) => vec![game_base, dir],
        None => vec![game_base],
    };
    scan_for_location(&roots, &pattern)
}

/// Find where a specific `attribute` is declared inside a `layeredimage
/// tag:` block, scanning forward through nested `group`/`always` blocks
/// using indentation to find the block's end.
#[must_use]
pub fn find_layeredimage_attribute(game_base: &Path, tag: &str, attribute: &str) -> Option<SourceLocation> {
    let escaped_tag = regex::escape(tag);
    let header = Regex::new(&format!(r"^\s*layeredimage\s+{escaped_tag}\s*:")).ok()?;
    let attr_line = Regex::new(&format!(r"^\s*attribute\s+{}\b", regex::escape(attribute))).ok()?;

    for file in rpy_files(game_base) {
        let Ok(text) = fs::read_to_string(&file) else {
            continue;
        };
        let lines: Vec<&str> = text.lines().collect();
        let Some(header_index) = lines.iter().position(|line| header.is_match(line)) else {
            continue;
        };
        let header_indent = indent_of(lines[header_index]);

        for (offset, line) in lines[header_index + 1..].iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if indent_of(line) <= header_indent {
                break;
            }
            if attr_line.is_match(line) {
                #[allow(clippy::cast_possible_truncation)]
                let line_no = (header_index + 1 + offset + 1) as u32;
                return Some(SourceLocation { file, line: line_no });
            }
        }
    }
    None
}

/// Find the first `show`/`scene` statement matching `tag` and (up to) its
/// first three attributes.
#[must_use]
pub fn find_show_statement(game_base: &Path, tag: &str, attrs: &[String]) -> Option<SourceLocation> {
    let escaped_tag = regex::escape(tag);
    let attr_group = attrs
        .iter()
        .take(3)
        .map(|a| format!(r"(\s+{})?", regex::escape(a)))
        .collect::<Vec<_>>()
        .join("");
    let pattern = Regex::new(&format!(r"^\s*(show|scene)\s+{escaped_tag}{attr_group}\b")).ok()?;
    scan_for_location(&[game_base], &pattern)
}

/// `getImageDefinition`'s dispatch order: a specific attribute's layer
/// declaration first, then the image statement itself, then a fallback to
/// wherever the image is first shown.
#[must_use]
pub fn get_image_definition(
    game_base: &Path,
    commondir: Option<&Path>,
    tag: &str,
    attrs: &[String],
) -> Option<SourceLocation> {
    if let Some(attribute) = attrs.first() {
        if let Some(loc) = find_layeredimage_attribute(game_base, tag, attribute) {
            return Some(loc);
        }
    }
    if let Some(loc) = find_image_definition(game_base, tag, attrs) {
        return Some(loc);
    }
    let _ = commondir;
    find_show_statement(game_base, tag, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_bare_image_statement() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("images.rpy"), "define e = 1\nimage eileen happy = \"happy.png\"\n").unwrap();
        let loc = find_image_definition(dir.path(), "eileen", &["happy".to_string()]).unwrap();
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn falls_back_to_tag_only_statement_when_attrs_absent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("images.rpy"), "image eileen = \"eileen.png\"\n").unwrap();
        let loc = find_image_definition(dir.path(), "eileen", &["happy".to_string()]).unwrap();
        assert_eq!(loc.line, 1);
    }

    #[test]
    fn finds_screen_definition_with_parenthesized_header() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("screens.rpy"), "screen inventory(slot):\n    pass\n").unwrap();
        let loc = find_screen_definition(dir.path(), None, "inventory").unwrap();
        assert_eq!(loc.line, 1);
    }

    #[test]
    fn finds_layeredimage_attribute_inside_nested_group() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("li.rpy"),
            "layeredimage eileen:\n    always:\n        \"base.png\"\n    group expression:\n        attribute happy:\n            \"happy.png\"\n        attribute sad:\n            \"sad.png\"\nimage other = 1\n",
        )
        .unwrap();
        let loc = find_layeredimage_attribute(dir.path(), "eileen", "sad").unwrap();
        assert_eq!(loc.line, 7);
    }

    #[test]
    fn stops_scanning_attribute_block_at_dedent() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("li.rpy"),
            "layeredimage eileen:\n    attribute happy:\n        \"happy.png\"\nlayeredimage other:\n    attribute happy:\n        \"other_happy.png\"\n",
        )
        .unwrap();
        let loc = find_layeredimage_attribute(dir.path(), "eileen", "happy").unwrap();
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn finds_show_statement_matching_tag_and_attributes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("script.rpy"), "label start:\n    show eileen happy\n").unwrap();
        let loc = find_show_statement(dir.path(), "eileen", &["happy".to_string()]).unwrap();
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn get_image_definition_prefers_attribute_declaration_over_show() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("script.rpy"),
            "layeredimage eileen:\n    attribute happy:\n        \"happy.png\"\nlabel start:\n    show eileen happy\n",
        )
        .unwrap();
        let loc = get_image_definition(dir.path(), None, "eileen", &["happy".to_string()]).unwrap();
        assert_eq!(loc.line, 2);
    }

    use crate::host::SceneEntry;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct StubDisplayable(&'static str);

    impl Displayable for StubDisplayable {
        fn type_name(&self) -> &str {
            "Image"
        }

        fn filename(&self) -> Option<&str> {
            Some(self.0)
        }
    }

    struct StubLayeredImage;

    impl LayeredImage for StubLayeredImage {
        fn layers(&self) -> Vec<LayeredLayer> {
            vec![
                LayeredLayer::Always { image: Some(Arc::new(StubDisplayable("base.png"))) },
                LayeredLayer::Attribute {
                    attribute: "happy".to_string(),
                    group: Some("mood".to_string()),
                    image: Some(Arc::new(StubDisplayable("happy.png"))),
                },
                LayeredLayer::Attribute {
                    attribute: "sad".to_string(),
                    group: Some("mood".to_string()),
                    image: Some(Arc::new(StubDisplayable("sad.png"))),
                },
            ]
        }

        fn attributes(&self) -> Vec<crate::host::AttributeDecl> {
            vec![
                crate::host::AttributeDecl { attribute: "happy".to_string(), default: false },
                crate::host::AttributeDecl { attribute: "sad".to_string(), default: false },
            ]
        }

        fn banned(&self, _applied: &HashSet<String>) -> HashSet<String> {
            HashSet::new()
        }
    }

    fn base_context() -> HostContext {
        HostContext {
            current_statement: None,
            return_stack: Vec::new(),
            expression_frames: Vec::new(),
            scene_lists: HashMap::new(),
            screens: Vec::new(),
            audio: AudioState::default(),
            current_speaker: None,
        }
    }

    #[test]
    fn scene_state_attaches_show_statement_and_type_for_a_plain_image() {
        let mut scene_lists = HashMap::new();
        scene_lists.insert(
            "master".to_string(),
            vec![SceneEntry {
                tag: "bg".to_string(),
                displayable: ShownImage::Plain(Arc::new(StubDisplayable("room.png"))),
                at_list: vec!["center".to_string()],
                attributes: Vec::new(),
            }],
        );
        let context = HostContext { scene_lists, ..base_context() };

        let state = scene_state(
            &context,
            Some("start".to_string()),
            Some(10),
            Path::new("/nonexistent"),
            None,
            |layer, tag| {
                (layer == "master" && tag == "bg").then(|| ShowProvenance {
                    file: "/g/s.rpy".to_string(),
                    line: 10,
                    statement_type: Some("scene"),
                })
            },
            |_| None,
        );

        let image = &state.layers[0].images[0];
        assert_eq!(image.file.as_deref(), Some("room.png"));
        assert_eq!(image.position.as_deref(), Some("center"));
        let show_statement = image.show_statement.as_ref().unwrap();
        assert_eq!(show_statement.line, 10);
        assert_eq!(image.statement_type, Some("scene"));
        assert!(!image.is_layered);
    }

    #[test]
    fn scene_state_resolves_layered_image_into_active_components() {
        let mut scene_lists = HashMap::new();
        scene_lists.insert(
            "master".to_string(),
            vec![SceneEntry {
                tag: "eileen".to_string(),
                displayable: ShownImage::Layered(Arc::new(StubLayeredImage)),
                at_list: Vec::new(),
                attributes: vec!["happy".to_string()],
            }],
        );
        let context = HostContext { scene_lists, ..base_context() };

        let state = scene_state(&context, None, None, Path::new("/nonexistent"), None, |_, _| None, |_| None);

        let image = &state.layers[0].images[0];
        assert!(image.is_layered);
        assert_eq!(image.file.as_deref(), Some("base.png"));
        assert_eq!(image.components.len(), 1);
        assert_eq!(image.components[0].attribute.as_deref(), Some("happy"));
        assert_eq!(image.components[0].group.as_deref(), Some("mood"));
    }

    struct StubLayeredImageWithDefault;

    impl LayeredImage for StubLayeredImageWithDefault {
        fn layers(&self) -> Vec<LayeredLayer> {
            vec![
                LayeredLayer::Always { image: None },
                LayeredLayer::Attribute { attribute: "neutral".to_string(), group: Some("mood".to_string()), image: None },
                LayeredLayer::Attribute { attribute: "happy".to_string(), group: Some("mood".to_string()), image: None },
            ]
        }

        fn attributes(&self) -> Vec<crate::host::AttributeDecl> {
            vec![
                crate::host::AttributeDecl { attribute: "neutral".to_string(), default: true },
                crate::host::AttributeDecl { attribute: "happy".to_string(), default: false },
            ]
        }

        fn banned(&self, _applied: &HashSet<String>) -> HashSet<String> {
            HashSet::new()
        }
    }

    #[test]
    fn layered_image_components_activates_declared_defaults_with_no_explicit_attributes() {
        let snapshot = layered_image_components(&StubLayeredImageWithDefault, &HashSet::new());
        let neutral = snapshot.components.iter().find(|c| c.attribute.as_deref() == Some("neutral")).unwrap();
        let happy = snapshot.components.iter().find(|c| c.attribute.as_deref() == Some("happy")).unwrap();
        assert!(neutral.active);
        assert!(!happy.active);
    }

    #[test]
    fn layered_image_components_does_not_activate_a_banned_default() {
        struct BansTheDefault;
        impl LayeredImage for BansTheDefault {
            fn layers(&self) -> Vec<LayeredLayer> {
                StubLayeredImageWithDefault.layers()
            }
            fn attributes(&self) -> Vec<crate::host::AttributeDecl> {
                StubLayeredImageWithDefault.attributes()
            }
            fn banned(&self, _applied: &HashSet<String>) -> HashSet<String> {
                HashSet::from(["neutral".to_string()])
            }
        }

        let snapshot = layered_image_components(&BansTheDefault, &HashSet::new());
        let neutral = snapshot.components.iter().find(|c| c.attribute.as_deref() == Some("neutral")).unwrap();
        assert!(!neutral.active);
    }

    #[test]
    fn hide_screen_clears_the_tracked_entry_used_by_scene_state() {
        let screens = vec![ScreenEntry { name: "quick_menu".to_string(), layer: "screens".to_string() }];
        let context = HostContext { screens, ..base_context() };

        let state = scene_state(&context, None, None, Path::new("/nonexistent"), None, |_, _| None, |_| None);
        assert!(state.screens[0].show_statement.is_none());
    }
}
