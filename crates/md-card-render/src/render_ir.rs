use md_card::{Rgb, Rgba};
use serde::{Deserialize, Serialize};

/// Face in the font fallback chain chosen to render a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontChoice {
    Regular,
    Bold,
    Monospace,
    /// Emoji-capable fallback face.
    Emoji,
    /// Extra fallback face, in registration order.
    Fallback(u8),
    /// No registered face covers the text; drawn as hollow boxes.
    Placeholder,
}

/// Semantic role of a text fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextRole {
    Body,
    Heading(u8),
    ListItem,
    /// Ordered-list number.
    ListMarker,
    TableCell,
    TableHeader,
    Code,
    Quote,
    Signature,
}

/// Resolved style passed to measurers and renderers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTextStyle {
    /// Size in pixels.
    pub size_px: f32,
    /// Line height multiplier.
    pub line_height: f32,
    /// Numeric weight; 700 and above is bold.
    pub weight: u16,
    pub italic: bool,
    /// Draw with the monospace face.
    pub monospace: bool,
    pub strikethrough: bool,
    /// Explicit color from markup. `None` resolves to the theme default.
    pub color: Option<Rgb>,
    /// Semantic role.
    pub role: TextRole,
}

impl ResolvedTextStyle {
    /// Regular body text at `size_px`.
    pub fn body(size_px: f32, line_height: f32) -> Self {
        Self {
            size_px,
            line_height,
            weight: 400,
            italic: false,
            monospace: false,
            strikethrough: false,
            color: None,
            role: TextRole::Body,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.weight >= 700
    }

    /// Same style with a different role.
    pub fn with_role(mut self, role: TextRole) -> Self {
        self.role = role;
        self
    }

    /// Face the fallback chain starts from.
    pub fn primary_font(&self) -> FontChoice {
        if self.monospace {
            FontChoice::Monospace
        } else if self.is_bold() {
            FontChoice::Bold
        } else {
            FontChoice::Regular
        }
    }
}

/// Gradient orientation for card backgrounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientDirection {
    /// Top to bottom.
    Vertical,
    /// Left to right.
    Horizontal,
    /// Top-left to bottom-right.
    #[default]
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
    /// Center outward.
    Radial,
}

impl GradientDirection {
    pub const ALL: [Self; 5] = [
        Self::Vertical,
        Self::Horizontal,
        Self::Diagonal,
        Self::AntiDiagonal,
        Self::Radial,
    ];

    /// Interpolation position in `[0, 1]` for pixel `(x, y)` on a
    /// `width` x `height` canvas.
    pub fn position(self, x: u32, y: u32, width: u32, height: u32) -> f32 {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        let (x, y) = (x as f32, y as f32);
        let t = match self {
            Self::Vertical => y / h,
            Self::Horizontal => x / w,
            Self::Diagonal => (x + y) / (w + h),
            Self::AntiDiagonal => ((w - x) + y) / (w + h),
            Self::Radial => {
                let (cx, cy) = (w / 2.0, h / 2.0);
                let max = (cx * cx + cy * cy).sqrt().max(1.0);
                ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / max
            }
        };
        t.clamp(0.0, 1.0)
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PxRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PxRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }
}

/// Full-canvas background gradient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientCommand {
    pub width: u32,
    pub height: u32,
    /// Evenly spaced color stops, at least two.
    pub stops: Vec<Rgb>,
    pub direction: GradientDirection,
}

/// Text draw command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextCommand {
    /// Left x.
    pub x: i32,
    /// Baseline y.
    pub baseline_y: i32,
    /// Content.
    pub text: String,
    /// Face chosen during layout.
    pub font: FontChoice,
    /// Measured advance width.
    pub width: i32,
    /// Final color after theme resolution.
    pub color: Rgb,
    /// Resolved style.
    pub style: ResolvedTextStyle,
}

/// Rule draw command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCommand {
    /// Start x.
    pub x: i32,
    /// Start y.
    pub y: i32,
    /// Length.
    pub length: u32,
    /// Thickness.
    pub thickness: u32,
    /// Horizontal if true; vertical if false.
    pub horizontal: bool,
    pub color: Rgba,
}

/// Rectangle command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectCommand {
    /// Left x.
    pub x: i32,
    /// Top y.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Filled if true; stroked outline otherwise.
    pub fill: bool,
    /// Corner radius; 0 for square corners.
    pub corner_radius: u32,
    pub color: Rgba,
}

/// List bullet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletCommand {
    /// Center x.
    pub cx: i32,
    /// Center y.
    pub cy: i32,
    pub diameter: u32,
    /// Filled disc for top-level items, ring for nested ones.
    pub filled: bool,
    pub color: Rgb,
}

/// Task-list checkbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxCommand {
    pub x: i32,
    pub y: i32,
    /// Edge length of the square.
    pub size: u32,
    pub checked: bool,
    /// Border color; also the fill when checked.
    pub color: Rgb,
    /// Check mark color.
    pub mark_color: Rgb,
}

/// Title image placement. Pixels come from the renderer's decoded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCommand {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub corner_radius: u32,
}

/// Clip the finished canvas to rounded corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipCornersCommand {
    pub radius: u32,
}

/// Backend-agnostic draw command in canvas pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    /// Fill the canvas with a gradient.
    Gradient(GradientCommand),
    /// Draw rectangle.
    Rect(RectCommand),
    /// Draw a line rule.
    Rule(RuleCommand),
    /// Draw text.
    Text(TextCommand),
    /// Draw a list bullet.
    Bullet(BulletCommand),
    /// Draw a task checkbox.
    Checkbox(CheckboxCommand),
    /// Composite the title image.
    Image(ImageCommand),
    /// Round the canvas corners.
    ClipCorners(ClipCornersCommand),
}

/// Resolved card geometry shared by both passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardGeometry {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Frosted panel bounds.
    pub panel: PxRect,
    /// Text content bounds inside the panel.
    pub content: PxRect,
    /// Title image slot.
    pub title: Option<PxRect>,
    /// Signature footer slot, anchored to the content bottom.
    pub signature: Option<PxRect>,
}

impl CardGeometry {
    /// Lowest y any content command may reach.
    pub fn content_bottom_limit(&self) -> i32 {
        self.content.bottom()
    }
}

/// Card represented as backend-agnostic draw commands.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderCard {
    pub geometry: CardGeometry,
    /// Gradient and frosted panel.
    pub background_commands: Vec<DrawCommand>,
    /// Block content in document order.
    pub content_commands: Vec<DrawCommand>,
    /// Title image, signature, and corner clip.
    pub overlay_commands: Vec<DrawCommand>,
}

impl RenderCard {
    pub fn new(geometry: CardGeometry) -> Self {
        Self {
            geometry,
            background_commands: Vec::with_capacity(2),
            content_commands: Vec::with_capacity(32),
            overlay_commands: Vec::with_capacity(3),
        }
    }

    pub fn width(&self) -> u32 {
        self.geometry.canvas_width
    }

    pub fn height(&self) -> u32 {
        self.geometry.canvas_height
    }

    pub fn push_background_command(&mut self, cmd: DrawCommand) {
        self.background_commands.push(cmd);
    }

    pub fn push_content_command(&mut self, cmd: DrawCommand) {
        self.content_commands.push(cmd);
    }

    pub fn push_overlay_command(&mut self, cmd: DrawCommand) {
        self.overlay_commands.push(cmd);
    }

    /// Iterate all layers in draw order without allocating.
    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> + '_ {
        self.background_commands
            .iter()
            .chain(self.content_commands.iter())
            .chain(self.overlay_commands.iter())
    }

    /// Number of commands across all layers.
    pub fn command_count(&self) -> usize {
        self.background_commands.len() + self.content_commands.len() + self.overlay_commands.len()
    }

    /// Serialize the command stream for inspection tools.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
