/// Per-instance RGBA color, uploaded as `Unorm8x4`.
///
/// ```
/// use instaclip::Color;
///
/// let steel = Color::rgb(70, 130, 180);
/// assert_eq!(steel.to_array(), [70, 130, 180, 255]);
///
/// let glazing = steel.with_alpha(64);
/// assert!(glazing.is_transparent());
/// assert_eq!(Color::WHITE.normalize(), [1.0, 1.0, 1.0, 1.0]);
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn with_alpha(self, alpha: u8) -> Self {
        let [r, g, b, _] = self.0;
        Self([r, g, b, alpha])
    }

    /// Anything short of full opacity blends with what is already in the target.
    pub fn is_transparent(&self) -> bool {
        self.0[3] < 255
    }

    /// Channels in `[0.0, 1.0]`, as the shader sees them.
    pub fn normalize(&self) -> [f32; 4] {
        self.0.map(|channel| channel as f32 / 255.0)
    }

    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }
}

impl From<[u8; 4]> for Color {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}
