//! Frame directives to [`TimelineProgram`].

use std::collections::{BTreeMap, HashMap};

use crate::error::SymbolError;
use crate::reader::{BlendMode, ColorTransform, Filter, Matrix, Rgba};
use crate::symbol::{SymbolKind, SymbolSource};
use crate::timeline::control::{ClipAction, ControlDirective, FrameDirectives, PlaceObject};
use crate::timeline::session::SessionAllocator;
use crate::timeline::{
    AddCommand, CommandStream, FrameLabel, FrameRecipe, FrameScript, PropertyPayloads,
    PropertyType, RemoveCommand, SoundCommand, StreamBlock, TimelineProgram, UpdateCommand,
};

const BUTTON_STATE_LABELS: [&str; 4] = ["_up", "_over", "_down", "_hit"];

/// Zero scale on one axis with no rotation or skew collapses the instance;
/// the authoring tool's players treat that axis as unscaled.
pub fn normalize_matrix(mut matrix: Matrix) -> Matrix {
    let no_skew = matrix.b == 0.0 && matrix.c == 0.0;
    if no_skew && matrix.a == 0.0 && matrix.d != 0.0 {
        matrix.a = 1.0;
    } else if no_skew && matrix.d == 0.0 && matrix.a != 0.0 {
        matrix.d = 1.0;
    }
    matrix
}

#[derive(Debug, Clone, Copy)]
pub struct TimelineCompiler {
    version: u8,
    button_mode: bool,
}

impl TimelineCompiler {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            button_mode: false,
        }
    }

    /// Every frame becomes its own keyframe and the display list starts
    /// empty for each one.
    pub fn button_mode(mut self, enabled: bool) -> Self {
        self.button_mode = enabled;
        self
    }

    /// Compile `frames`. The only error is a cyclic symbol reference;
    /// directives naming missing or failed symbols are skipped.
    pub fn compile(
        &self,
        frames: &[FrameDirectives],
        source: &mut dyn SymbolSource,
    ) -> Result<TimelineProgram, SymbolError> {
        let mut state = DisplayState::default();
        let mut out = ProgramBuilder::default();
        let case_sensitive_labels = self.version >= 7;

        for (frame_index, frame) in frames.iter().enumerate() {
            let frame_number = frame_index as u32;
            if let Some(data) = frame.sound_stream_block {
                out.stream_blocks.push(StreamBlock {
                    frame: frame_number,
                    data,
                });
            }

            let extends_previous = frame_index > 0 && !self.button_mode && frame.is_empty();
            if extends_previous {
                if let Some(duration) = out.durations.last_mut() {
                    *duration += 1;
                }
                out.frame_to_keyframe.push(out.durations.len() as u32 - 1);
                continue;
            }

            if self.button_mode && frame_index > 0 {
                state.clear_silently();
            }

            let keyframe = out.durations.len() as u32;
            out.durations.push(1);
            out.first_frames.push(frame_number);
            out.frame_to_keyframe.push(keyframe);

            for label in &frame.labels {
                let name = if case_sensitive_labels {
                    label.clone()
                } else {
                    label.to_lowercase()
                };
                if out.labels.iter().any(|existing| existing.name == name) {
                    tracing::debug!(label = %name, frame = frame_number, "ignoring duplicate frame label");
                    continue;
                }
                out.labels.push(FrameLabel {
                    name,
                    keyframe,
                    frame: frame_number,
                });
            }
            for actions in &frame.action_blocks {
                out.scripts.push(FrameScript {
                    keyframe,
                    actions: *actions,
                });
            }

            let mut pending = KeyframeChanges::default();
            for command in &frame.commands {
                match command {
                    ControlDirective::Place(place) => state.place(place, &mut pending, source)?,
                    ControlDirective::Remove { depth, .. } => state.remove(*depth, &mut pending),
                    ControlDirective::StartSound { target, info } => {
                        pending.sounds.push(SoundCommand {
                            target: target.clone(),
                            info: info.clone(),
                        });
                    }
                }
            }
            state.update_masks(&mut pending);
            state.seal_updates(&mut pending);
            out.push_keyframe(pending);
        }

        let is_button = self.button_mode || looks_like_button(frames);
        Ok(out.finish(
            frames.len() as u32,
            is_button,
            case_sensitive_labels,
            state.sessions,
        ))
    }
}

/// Four frames labelled with the button state names, in order, and
/// nothing else.
fn looks_like_button(frames: &[FrameDirectives]) -> bool {
    frames.len() == BUTTON_STATE_LABELS.len()
        && frames
            .iter()
            .zip(BUTTON_STATE_LABELS)
            .all(|(frame, expected)| frame.labels.len() == 1 && frame.labels[0] == expected)
}

#[derive(Debug, Clone, PartialEq)]
enum Property {
    Matrix(Matrix),
    ColorTransform(ColorTransform),
    Name(String),
    Ratio(u16),
    Masks(Vec<u32>),
    IsMask(bool),
    BlendMode(BlendMode),
    Filters(Vec<Filter>),
    Visible(bool),
    CacheAsBitmap(bool),
    OpaqueBackground(Rgba),
    SwapGraphics(u16),
    ClassName(String),
    ClipActions(Vec<ClipAction>),
}

impl Property {
    fn ty(&self) -> PropertyType {
        match self {
            Self::Matrix(_) => PropertyType::Matrix,
            Self::ColorTransform(_) => PropertyType::ColorTransform,
            Self::Name(_) => PropertyType::Name,
            Self::Ratio(_) => PropertyType::Ratio,
            Self::Masks(_) => PropertyType::Masks,
            Self::IsMask(_) => PropertyType::IsMask,
            Self::BlendMode(_) => PropertyType::BlendMode,
            Self::Filters(_) => PropertyType::Filters,
            Self::Visible(_) => PropertyType::Visible,
            Self::CacheAsBitmap(_) => PropertyType::CacheAsBitmap,
            Self::OpaqueBackground(_) => PropertyType::OpaqueBackground,
            Self::SwapGraphics(_) => PropertyType::SwapGraphics,
            Self::ClassName(_) => PropertyType::ClassName,
            Self::ClipActions(_) => PropertyType::ClipActions,
        }
    }
}

#[derive(Debug)]
struct StagedUpdate {
    session_id: u32,
    properties: Vec<Property>,
}

impl StagedUpdate {
    /// Later values of the same kind replace earlier ones.
    fn set(&mut self, property: Property) {
        let ty = property.ty();
        match self.properties.iter_mut().find(|p| p.ty() == ty) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    fn has(&self, ty: PropertyType) -> bool {
        self.properties.iter().any(|p| p.ty() == ty)
    }
}

/// Commands gathered for the keyframe being built.
#[derive(Debug, Default)]
struct KeyframeChanges {
    removes: Vec<RemoveCommand>,
    adds: Vec<AddCommand>,
    /// Keyed by depth; at most one live instance per depth.
    updates: BTreeMap<u16, StagedUpdate>,
    sounds: Vec<SoundCommand>,
}

impl KeyframeChanges {
    fn update(&mut self, depth: u16, session_id: u32) -> &mut StagedUpdate {
        let staged = self.updates.entry(depth).or_insert_with(|| StagedUpdate {
            session_id,
            properties: Vec::new(),
        });
        if staged.session_id != session_id {
            staged.session_id = session_id;
            staged.properties.clear();
        }
        staged
    }
}

/// One occupied depth of the virtual display list.
#[derive(Debug)]
struct DisplayNode {
    session_id: u32,
    /// Symbol currently shown; for containers this changes on swaps.
    symbol_id: u16,
    kind: SymbolKind,
    container: bool,
    name: Option<String>,
    clip_depth: Option<u16>,
    masks: Vec<u32>,
    is_mask: bool,
}

/// How a placement relates to what is already at its depth.
enum Placement {
    /// New instance, minted or taken from a free list.
    Added { fresh: bool },
    Existing,
}

#[derive(Default)]
struct DisplayState {
    nodes: BTreeMap<u16, DisplayNode>,
    /// Last matrix placed at each depth.
    matrices: HashMap<u16, Matrix>,
    sessions: SessionAllocator,
}

impl DisplayState {
    fn place(
        &mut self,
        place: &PlaceObject,
        changes: &mut KeyframeChanges,
        source: &mut dyn SymbolSource,
    ) -> Result<(), SymbolError> {
        let depth = place.depth;
        let placement = match place.character_id {
            Some(character_id) => {
                let Some(symbol) = source.try_symbol(character_id)? else {
                    return Ok(());
                };
                let kind = symbol.kind();
                if !kind.is_displayable() {
                    tracing::warn!(character_id, depth, %kind, "ignoring placement of a non-display symbol");
                    return Ok(());
                }
                self.place_character(place, character_id, kind, changes)
            }
            None if self.nodes.contains_key(&depth) => Placement::Existing,
            None => {
                tracing::trace!(depth, "ignoring update of an empty depth");
                return Ok(());
            }
        };
        self.apply_properties(place, placement, changes);
        Ok(())
    }

    fn place_character(
        &mut self,
        place: &PlaceObject,
        character_id: u16,
        kind: SymbolKind,
        changes: &mut KeyframeChanges,
    ) -> Placement {
        let depth = place.depth;
        let mut carried_matrix = None;
        if let Some(node) = self.nodes.get_mut(&depth) {
            if node.symbol_id == character_id {
                return Placement::Existing;
            }
            if node.container && kind.is_graphics_only() {
                node.symbol_id = character_id;
                node.kind = kind;
                self.sessions.swap_symbol(node.session_id, character_id);
                changes
                    .update(depth, node.session_id)
                    .set(Property::SwapGraphics(character_id));
                return Placement::Existing;
            }
            carried_matrix = self.matrices.get(&depth).copied();
            self.remove(depth, changes);
        }

        let container = kind.is_graphics_only();
        let acquired = self
            .sessions
            .acquire(character_id, place.name.as_deref(), container);
        changes.adds.push(AddCommand {
            session_id: acquired.session_id,
            depth,
        });
        if let Some(name) = acquired.rename {
            changes
                .update(depth, acquired.session_id)
                .set(Property::Name(name.unwrap_or_default()));
        }
        if place.matrix.is_none() {
            if let Some(matrix) = carried_matrix {
                self.matrices.insert(depth, matrix);
                changes
                    .update(depth, acquired.session_id)
                    .set(Property::Matrix(matrix));
            }
        }
        self.nodes.insert(
            depth,
            DisplayNode {
                session_id: acquired.session_id,
                symbol_id: character_id,
                kind,
                container,
                name: place.name.clone(),
                clip_depth: None,
                masks: Vec::new(),
                is_mask: false,
            },
        );
        Placement::Added {
            fresh: !acquired.reused,
        }
    }

    /// Stage everything `place` sets. A freshly minted instance already
    /// has default properties, so defaults are not emitted for it; a reused
    /// instance is reset explicitly.
    fn apply_properties(&mut self, place: &PlaceObject, placement: Placement, changes: &mut KeyframeChanges) {
        let depth = place.depth;
        let Some(node) = self.nodes.get_mut(&depth) else {
            return;
        };
        let (fresh, reused) = match placement {
            Placement::Added { fresh } => (fresh, !fresh),
            Placement::Existing => (false, false),
        };
        let update = changes.update(depth, node.session_id);

        match place.matrix.map(normalize_matrix) {
            Some(matrix) => {
                self.matrices.insert(depth, matrix);
                if !(fresh && matrix.is_identity()) {
                    update.set(Property::Matrix(matrix));
                }
            }
            None if reused && !update.has(PropertyType::Matrix) => {
                self.matrices.insert(depth, Matrix::IDENTITY);
                update.set(Property::Matrix(Matrix::IDENTITY));
            }
            None => {}
        }

        match place.color_transform {
            Some(cxform) if !(fresh && cxform.is_identity()) => {
                update.set(Property::ColorTransform(cxform));
            }
            None if reused => update.set(Property::ColorTransform(ColorTransform::default())),
            _ => {}
        }

        if let Some(ratio) = place.ratio {
            if node.kind.accepts_ratio() {
                update.set(Property::Ratio(ratio));
            }
        }

        if matches!(placement, Placement::Existing) {
            if let Some(name) = &place.name {
                if node.name.as_ref() != Some(name) {
                    node.name = Some(name.clone());
                    self.sessions.rename(node.session_id, Some(name.clone()));
                    update.set(Property::Name(name.clone()));
                }
            }
        }

        if let Some(clip_depth) = place.clip_depth {
            node.clip_depth = Some(clip_depth);
        }
        if let Some(filters) = &place.filters {
            update.set(Property::Filters(filters.clone()));
        }
        match place.blend_mode {
            Some(mode) if !(fresh && mode == BlendMode::Normal) => {
                update.set(Property::BlendMode(mode));
            }
            _ => {}
        }
        if let Some(cache) = place.cache_as_bitmap {
            update.set(Property::CacheAsBitmap(cache));
        }
        if let Some(visible) = place.visible {
            update.set(Property::Visible(visible));
        }
        if let Some(color) = place.background_color {
            update.set(Property::OpaqueBackground(color));
        }
        if let Some(class_name) = &place.class_name {
            update.set(Property::ClassName(class_name.clone()));
        }
        if let Some(actions) = &place.clip_actions {
            update.set(Property::ClipActions(actions.clone()));
        }
    }

    fn remove(&mut self, depth: u16, changes: &mut KeyframeChanges) {
        let Some(node) = self.nodes.remove(&depth) else {
            tracing::trace!(depth, "ignoring removal of an empty depth");
            return;
        };
        self.matrices.remove(&depth);
        changes.updates.remove(&depth);
        match changes.adds.iter().position(|add| add.session_id == node.session_id) {
            // Added and removed within one frame: neither is emitted.
            Some(index) => {
                changes.adds.remove(index);
            }
            None => changes.removes.push(RemoveCommand {
                session_id: node.session_id,
                depth,
            }),
        }
        self.sessions.release(node.session_id);
    }

    /// A mask at depth `m` with clip depth `c` clips every node at depth
    /// `d` with `m < d <= c`.
    fn update_masks(&mut self, changes: &mut KeyframeChanges) {
        let masks: Vec<(u16, u16, u32)> = self
            .nodes
            .iter()
            .filter_map(|(depth, node)| node.clip_depth.map(|clip| (*depth, clip, node.session_id)))
            .collect();

        for (depth, node) in &mut self.nodes {
            let mut clipped_by: Vec<u32> = masks
                .iter()
                .filter(|(mask_depth, clip_depth, _)| mask_depth < depth && depth <= clip_depth)
                .map(|(_, _, session_id)| *session_id)
                .collect();
            clipped_by.sort_unstable();
            if clipped_by != node.masks {
                changes
                    .update(*depth, node.session_id)
                    .set(Property::Masks(clipped_by.clone()));
                node.masks = clipped_by;
            }

            let is_mask = node.clip_depth.is_some();
            if is_mask != node.is_mask {
                changes
                    .update(*depth, node.session_id)
                    .set(Property::IsMask(is_mask));
                node.is_mask = is_mask;
            }
        }
    }

    /// Drop empty updates and re-emit the last known matrix with every
    /// remaining one.
    fn seal_updates(&self, changes: &mut KeyframeChanges) {
        changes.updates.retain(|_, update| !update.properties.is_empty());
        for (depth, update) in &mut changes.updates {
            if !update.has(PropertyType::Matrix) {
                if let Some(matrix) = self.matrices.get(depth) {
                    update.properties.insert(0, Property::Matrix(*matrix));
                }
            }
        }
    }

    /// Start a button state from an empty display list. Nothing is
    /// emitted; the player shows one state at a time.
    fn clear_silently(&mut self) {
        for node in self.nodes.values() {
            self.sessions.release(node.session_id);
        }
        self.nodes.clear();
        self.matrices.clear();
    }
}

struct StreamBuilder<T> {
    index: Vec<u32>,
    length: Vec<u32>,
    commands: Vec<T>,
}

// derived Default would require `T: Default`
impl<T> Default for StreamBuilder<T> {
    fn default() -> Self {
        Self {
            index: Vec::new(),
            length: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl<T> StreamBuilder<T> {
    fn push_group(&mut self, group: Vec<T>) -> bool {
        self.index.push(self.commands.len() as u32);
        self.length.push(group.len() as u32);
        let present = !group.is_empty();
        self.commands.extend(group);
        present
    }

    fn seal(self) -> CommandStream<T> {
        CommandStream {
            index: self.index.into_boxed_slice(),
            length: self.length.into_boxed_slice(),
            commands: self.commands.into_boxed_slice(),
        }
    }
}

#[derive(Default)]
struct PayloadBuilder {
    ints: Vec<i32>,
    matrices: Vec<[f32; 6]>,
    color_transforms: Vec<[f32; 8]>,
    strings: Vec<String>,
    filters: Vec<Vec<Filter>>,
    mask_lists: Vec<Box<[u32]>>,
    clip_actions: Vec<Vec<ClipAction>>,
}

impl PayloadBuilder {
    /// Store a property's value and return its index in the payload array
    /// its type selects.
    fn push(&mut self, property: Property) -> u32 {
        fn append<T>(list: &mut Vec<T>, value: T) -> u32 {
            list.push(value);
            list.len() as u32 - 1
        }
        match property {
            Property::Matrix(matrix) => append(&mut self.matrices, matrix.to_array()),
            Property::ColorTransform(cxform) => {
                append(&mut self.color_transforms, cxform.to_array())
            }
            Property::Name(name) | Property::ClassName(name) => append(&mut self.strings, name),
            Property::Ratio(ratio) => append(&mut self.ints, i32::from(ratio)),
            Property::Masks(masks) => append(&mut self.mask_lists, masks.into_boxed_slice()),
            Property::IsMask(flag) | Property::Visible(flag) | Property::CacheAsBitmap(flag) => {
                append(&mut self.ints, i32::from(flag))
            }
            Property::BlendMode(mode) => append(&mut self.ints, i32::from(mode.to_u8())),
            Property::Filters(filters) => append(&mut self.filters, filters),
            Property::OpaqueBackground(color) => append(&mut self.ints, color.to_argb() as i32),
            Property::SwapGraphics(id) => append(&mut self.ints, i32::from(id)),
            Property::ClipActions(actions) => append(&mut self.clip_actions, actions),
        }
    }

    fn seal(self) -> PropertyPayloads {
        PropertyPayloads {
            ints: self.ints.into_boxed_slice(),
            matrices: self.matrices.into_boxed_slice(),
            color_transforms: self.color_transforms.into_boxed_slice(),
            strings: self.strings.into_boxed_slice(),
            filters: self.filters.into_boxed_slice(),
            mask_lists: self.mask_lists.into_boxed_slice(),
            clip_actions: self.clip_actions.into_boxed_slice(),
        }
    }
}

#[derive(Default)]
struct ProgramBuilder {
    durations: Vec<u32>,
    first_frames: Vec<u32>,
    frame_to_keyframe: Vec<u32>,
    recipes: Vec<FrameRecipe>,
    removes: StreamBuilder<RemoveCommand>,
    adds: StreamBuilder<AddCommand>,
    updates: StreamBuilder<UpdateCommand>,
    sounds: StreamBuilder<SoundCommand>,
    property_types: Vec<PropertyType>,
    property_indices: Vec<u32>,
    payloads: PayloadBuilder,
    labels: Vec<FrameLabel>,
    scripts: Vec<FrameScript>,
    stream_blocks: Vec<StreamBlock>,
}

impl ProgramBuilder {
    /// Emit the groups in player order: remove, add, update, sound.
    fn push_keyframe(&mut self, changes: KeyframeChanges) {
        let mut recipe = FrameRecipe::empty();
        recipe.set(FrameRecipe::REMOVE, self.removes.push_group(changes.removes));
        recipe.set(FrameRecipe::ADD, self.adds.push_group(changes.adds));

        let mut updates = Vec::with_capacity(changes.updates.len());
        for (depth, staged) in changes.updates {
            let property_start = self.property_types.len() as u32;
            let property_count = staged.properties.len() as u32;
            for property in staged.properties {
                self.property_types.push(property.ty());
                let index = self.payloads.push(property);
                self.property_indices.push(index);
            }
            updates.push(UpdateCommand {
                session_id: staged.session_id,
                depth,
                property_start,
                property_count,
            });
        }
        recipe.set(FrameRecipe::UPDATE, self.updates.push_group(updates));
        recipe.set(FrameRecipe::SOUND, self.sounds.push_group(changes.sounds));
        self.recipes.push(recipe);
    }

    fn finish(
        self,
        frame_count: u32,
        is_button: bool,
        case_sensitive_labels: bool,
        sessions: SessionAllocator,
    ) -> TimelineProgram {
        TimelineProgram {
            frame_count,
            is_button,
            keyframe_durations: self.durations.into_boxed_slice(),
            keyframe_first_frames: self.first_frames.into_boxed_slice(),
            frame_to_keyframe: self.frame_to_keyframe.into_boxed_slice(),
            frame_recipes: self.recipes.into_boxed_slice(),
            removes: self.removes.seal(),
            adds: self.adds.seal(),
            updates: self.updates.seal(),
            sounds: self.sounds.seal(),
            property_types: self.property_types.into_boxed_slice(),
            property_indices: self.property_indices.into_boxed_slice(),
            payloads: self.payloads.seal(),
            labels: self.labels.into_boxed_slice(),
            case_sensitive_labels,
            frame_scripts: self.scripts.into_boxed_slice(),
            stream_blocks: self.stream_blocks.into_boxed_slice(),
            sessions: sessions.into_sessions().into_boxed_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::decoders::bitmap::{ImageDefinition, ImageFormat};
    use crate::decoders::shape::{MorphShapeDefinition, ShapeDefinition};
    use crate::reader::Rect;
    use crate::symbol::Symbol;
    use crate::tag::ByteSpan;
    use crate::timeline::PropertyValue;

    #[derive(Default)]
    struct Library {
        symbols: HashMap<u16, Rc<Symbol>>,
        cyclic: Option<u16>,
        awaiting: Option<u16>,
    }

    impl Library {
        fn shape(mut self, id: u16) -> Self {
            let shape = ShapeDefinition {
                id,
                ..ShapeDefinition::default()
            };
            self.symbols.insert(id, Rc::new(Symbol::Shape(shape)));
            self
        }

        fn morph(mut self, id: u16) -> Self {
            let morph = MorphShapeDefinition {
                id,
                version: 1,
                start_bounds: Rect::default(),
                end_bounds: Rect::default(),
                start_edge_bounds: None,
                end_edge_bounds: None,
                fill_styles: Vec::new(),
                line_styles: Vec::new(),
                start_paths: Vec::new(),
                end_paths: Vec::new(),
            };
            self.symbols.insert(id, Rc::new(Symbol::MorphShape(morph)));
            self
        }

        /// A displayable symbol that is not wrapped in a container.
        fn instance(mut self, id: u16) -> Self {
            let image = ImageDefinition {
                id,
                version: 2,
                format: ImageFormat::Png,
                width: 1,
                height: 1,
                data: ByteSpan::default(),
                alpha: None,
                deblock: None,
                uses_jpeg_tables: false,
                decoded: None,
            };
            self.symbols.insert(id, Rc::new(Symbol::Image(image)));
            self
        }
    }

    impl SymbolSource for Library {
        fn symbol(&mut self, id: u16) -> Result<Rc<Symbol>, SymbolError> {
            if self.cyclic == Some(id) {
                return Err(SymbolError::CyclicSymbolReference(id));
            }
            if self.awaiting == Some(id) {
                return Err(SymbolError::Pending(id));
            }
            self.symbols
                .get(&id)
                .cloned()
                .ok_or(SymbolError::Undefined(id))
        }
    }

    fn place(depth: u16, character_id: u16) -> ControlDirective {
        ControlDirective::Place(PlaceObject {
            version: 2,
            depth,
            character_id: Some(character_id),
            ..PlaceObject::default()
        })
    }

    fn place_with(f: impl FnOnce(&mut PlaceObject)) -> ControlDirective {
        let mut place = PlaceObject {
            version: 2,
            ..PlaceObject::default()
        };
        f(&mut place);
        ControlDirective::Place(place)
    }

    fn remove(depth: u16) -> ControlDirective {
        ControlDirective::Remove {
            depth,
            character_id: None,
        }
    }

    fn frame(commands: Vec<ControlDirective>) -> FrameDirectives {
        FrameDirectives {
            commands,
            ..FrameDirectives::default()
        }
    }

    fn labelled(label: &str) -> FrameDirectives {
        FrameDirectives {
            labels: vec![label.to_string()],
            ..FrameDirectives::default()
        }
    }

    fn compile(frames: &[FrameDirectives], library: &mut Library) -> TimelineProgram {
        TimelineCompiler::new(10).compile(frames, library).unwrap()
    }

    #[test]
    fn test_three_frame_scenario() {
        let mut library = Library::default().instance(10);
        let frames = [
            frame(vec![place_with(|p| {
                p.depth = 1;
                p.character_id = Some(10);
                p.matrix = Some(Matrix::IDENTITY);
                p.name = Some("ball".into());
            })]),
            FrameDirectives::default(),
            frame(vec![remove(1)]),
        ];
        let program = compile(&frames, &mut library);

        assert_eq!(&*program.keyframe_durations, &[2, 1]);
        assert_eq!(&*program.frame_recipes, &[FrameRecipe::ADD, FrameRecipe::REMOVE]);
        let add = program.adds.for_keyframe(0)[0];
        let removed = program.removes.for_keyframe(1)[0];
        assert_eq!(add.session_id, removed.session_id);
        assert_eq!(program.sessions[add.session_id as usize].instance_name.as_deref(), Some("ball"));
        assert_eq!(&*program.frame_to_keyframe, &[0, 0, 1]);
        assert_eq!(&*program.keyframe_first_frames, &[0, 2]);
    }

    #[test]
    fn test_durations_sum_to_frame_count() {
        let mut library = Library::default().shape(1);
        let frames = [
            FrameDirectives::default(),
            FrameDirectives::default(),
            frame(vec![place(1, 1)]),
            FrameDirectives::default(),
            labelled("end"),
            FrameDirectives::default(),
        ];
        let program = compile(&frames, &mut library);
        assert_eq!(program.keyframe_durations.iter().sum::<u32>(), frames.len() as u32);
        assert_eq!(program.frame_count, 6);
        assert_eq!(program.label_keyframe("end"), Some(2));
    }

    #[test]
    fn test_degenerate_matrix_is_fixed() {
        let mut library = Library::default().shape(1);
        let squashed = Matrix {
            a: 0.0,
            b: 0.0,
            c: 0.0,
            d: 2.0,
            tx: 0,
            ty: 0,
        };
        let frames = [frame(vec![place_with(|p| {
            p.depth = 1;
            p.character_id = Some(1);
            p.matrix = Some(squashed);
        })])];
        let program = compile(&frames, &mut library);

        let update = program.updates.for_keyframe(0)[0];
        let values: Vec<_> = program.properties(&update).collect();
        assert_eq!(values, vec![PropertyValue::Matrix(&[1.0, 0.0, 0.0, 2.0, 0.0, 0.0])]);
    }

    #[test]
    fn test_session_reuse_by_name() {
        let mut library = Library::default().instance(5);
        let named = |name: &str| {
            let name = name.to_string();
            place_with(move |p| {
                p.depth = 3;
                p.character_id = Some(5);
                p.name = Some(name);
            })
        };
        let frames = [
            frame(vec![named("x")]),
            frame(vec![remove(3)]),
            frame(vec![named("x")]),
            frame(vec![remove(3), named("y")]),
        ];
        let program = compile(&frames, &mut library);

        let first = program.adds.for_keyframe(0)[0].session_id;
        assert_eq!(program.adds.for_keyframe(2)[0].session_id, first);
        // "y" does not take the slot freed for "x" in the same frame.
        assert_ne!(program.adds.for_keyframe(3)[0].session_id, first);
        assert_eq!(program.sessions.len(), 2);
    }

    #[test]
    fn test_reused_session_resets_matrix() {
        let mut library = Library::default().instance(5);
        let frames = [
            frame(vec![place(1, 5)]),
            frame(vec![remove(1)]),
            frame(vec![place(1, 5)]),
        ];
        let program = compile(&frames, &mut library);
        assert_eq!(program.frame_recipes[0], FrameRecipe::ADD);
        assert_eq!(program.frame_recipes[2], FrameRecipe::ADD | FrameRecipe::UPDATE);
        let update = program.updates.for_keyframe(2)[0];
        assert!(program
            .properties(&update)
            .any(|value| value == PropertyValue::Matrix(&Matrix::IDENTITY.to_array())));
    }

    #[test]
    fn test_mask_changes_emit_updates() {
        let mut library = Library::default().shape(1).shape(2).shape(3);
        let frames = [
            frame(vec![
                place_with(|p| {
                    p.depth = 1;
                    p.character_id = Some(1);
                    p.clip_depth = Some(3);
                }),
                place(2, 2),
            ]),
            // unrelated change: the masked node's set is unchanged
            frame(vec![place(5, 3)]),
            // node at depth 3 enters the mask
            frame(vec![place(3, 3)]),
        ];
        let program = compile(&frames, &mut library);

        let masked_sessions = |keyframe: usize| -> Vec<(u16, Vec<u32>)> {
            program
                .updates
                .for_keyframe(keyframe)
                .iter()
                .flat_map(|update| {
                    program.properties(update).filter_map(move |value| match value {
                        PropertyValue::Masks(masks) => Some((update.depth, masks.to_vec())),
                        _ => None,
                    })
                })
                .collect()
        };
        let mask_session = program.adds.for_keyframe(0)[0].session_id;
        assert_eq!(masked_sessions(0), vec![(2, vec![mask_session])]);
        assert!(masked_sessions(1).is_empty());
        assert_eq!(masked_sessions(2), vec![(3, vec![mask_session])]);
    }

    #[test]
    fn test_swap_graphics_on_container() {
        let mut library = Library::default().shape(1).shape(2);
        let frames = [
            frame(vec![place(1, 1)]),
            frame(vec![place_with(|p| {
                p.depth = 1;
                p.is_move = true;
                p.character_id = Some(2);
            })]),
        ];
        let program = compile(&frames, &mut library);
        assert_eq!(program.frame_recipes[1], FrameRecipe::UPDATE);
        let update = program.updates.for_keyframe(1)[0];
        assert!(program
            .properties(&update)
            .any(|value| value == PropertyValue::SwapGraphics(2)));
        assert!(program.sessions[0].container);
    }

    #[test]
    fn test_ratio_only_for_morph_shapes() {
        let mut library = Library::default().shape(1).morph(2);
        let with_ratio = |depth, id| {
            place_with(move |p| {
                p.depth = depth;
                p.character_id = Some(id);
                p.ratio = Some(100);
            })
        };
        let frames = [frame(vec![with_ratio(1, 1), with_ratio(2, 2)])];
        let program = compile(&frames, &mut library);
        let updates = program.updates.for_keyframe(0);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].depth, 2);
        assert!(program
            .properties(&updates[0])
            .any(|value| value == PropertyValue::Ratio(100)));
    }

    #[test]
    fn test_add_then_remove_in_one_frame_cancels() {
        let mut library = Library::default().shape(1);
        let frames = [frame(vec![place(1, 1), remove(1)])];
        let program = compile(&frames, &mut library);
        assert_eq!(program.frame_recipes[0], FrameRecipe::empty());
    }

    #[test]
    fn test_update_of_empty_depth_is_ignored() {
        let mut library = Library::default();
        let frames = [frame(vec![place_with(|p| {
            p.depth = 4;
            p.is_move = true;
            p.matrix = Some(Matrix::IDENTITY);
        })])];
        let program = compile(&frames, &mut library);
        assert!(program.updates.commands.is_empty());
    }

    #[test]
    fn test_missing_symbol_is_skipped_but_cycle_fails() {
        let mut library = Library::default();
        let frames = [frame(vec![place(1, 9)])];
        let program = compile(&frames, &mut library);
        assert!(program.adds.commands.is_empty());

        library.cyclic = Some(9);
        let err = TimelineCompiler::new(10).compile(&frames, &mut library).unwrap_err();
        assert_eq!(err, SymbolError::CyclicSymbolReference(9));
    }

    #[test]
    fn test_symbol_awaiting_asset_fails_compile() {
        let mut library = Library::default();
        library.awaiting = Some(9);
        let frames = [frame(vec![place(1, 9)])];
        let err = TimelineCompiler::new(10).compile(&frames, &mut library).unwrap_err();
        assert_eq!(err, SymbolError::Pending(9));
    }

    #[test]
    fn test_frame_with_undecodable_tags_is_a_keyframe() {
        let mut library = Library::default().shape(1);
        let frames = [
            frame(vec![place(1, 1)]),
            FrameDirectives {
                had_control_tags: true,
                ..FrameDirectives::default()
            },
            FrameDirectives::default(),
        ];
        let program = compile(&frames, &mut library);
        assert_eq!(&*program.keyframe_durations, &[1, 2]);
    }

    #[test]
    fn test_button_labels_mark_button() {
        let mut library = Library::default();
        let frames: Vec<_> = BUTTON_STATE_LABELS.iter().map(|label| labelled(label)).collect();
        assert!(compile(&frames, &mut library).is_button);

        let shuffled = [labelled("_over"), labelled("_up"), labelled("_down"), labelled("_hit")];
        assert!(!compile(&shuffled, &mut library).is_button);

        let mut extra = frames.clone();
        extra[2].labels.push("pressed".to_string());
        assert!(!compile(&extra, &mut library).is_button);
    }

    #[test]
    fn test_button_mode_keeps_every_state() {
        let mut library = Library::default().shape(1);
        let frames = [
            frame(vec![place(1, 1)]),
            FrameDirectives::default(),
            frame(vec![place(1, 1)]),
            frame(vec![place(1, 1)]),
        ];
        let program = TimelineCompiler::new(10)
            .button_mode(true)
            .compile(&frames, &mut library)
            .unwrap();
        assert_eq!(&*program.keyframe_durations, &[1, 1, 1, 1]);
        assert!(program.removes.commands.is_empty());
        assert!(program.is_button);
        // Each state starts empty, so the slot is reused for every add.
        assert!(program.adds.commands.iter().all(|add| add.session_id == 0));
    }

    #[test]
    fn test_legacy_labels_are_case_folded() {
        let mut library = Library::default();
        let frames = [labelled("Start"), labelled("START")];
        let program = TimelineCompiler::new(6).compile(&frames, &mut library).unwrap();
        assert_eq!(program.labels.len(), 1);
        assert_eq!(program.label_keyframe("start"), Some(0));
        assert!(!program.case_sensitive_labels);
    }
}
