use serde::Serialize;

/// A color for an LED strip, with an optional white channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Color {
    /// Red component.
    pub red: u8,
    /// Green component.
    pub green: u8,
    /// Blue component.
    pub blue: u8,
    /// White component.
    #[serde(default)]
    pub white: u8,
}

impl Color {
    /// Creates a [`Color`] from its red, green, and blue components.
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white: 0,
        }
    }

    /// Creates a [`Color`] from its red, green, blue, and white components.
    #[must_use]
    pub const fn rgbw(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white,
        }
    }

    /// Creates a [`Color`] with all channels set to the same brightness.
    ///
    /// The brightness is clamped to the `[0, 1]` range.
    #[must_use]
    pub fn from_brightness(brightness: f32) -> Self {
        let value = (brightness.clamp(0.0, 1.0) * 255.0) as u8;
        Self::rgbw(value, value, value, value)
    }

    /// Returns the color packed as `0xWWRRGGBB`.
    #[must_use]
    pub const fn to_wrgb(self) -> u32 {
        (self.white as u32) << 24
            | (self.red as u32) << 16
            | (self.green as u32) << 8
            | self.blue as u32
    }

    /// Returns whether every channel is off.
    #[must_use]
    pub const fn is_off(self) -> bool {
        self.to_wrgb() == 0
    }
}

impl core::fmt::Display for Color {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "r: {}, g: {}, b: {}, w: {}",
            self.red, self.green, self.blue, self.white
        )
    }
}
