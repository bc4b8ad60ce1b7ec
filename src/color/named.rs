//! CSS color keywords and named color scales.

use super::Rgba;

const CSS_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("lime", [0, 255, 0]),
    ("green", [0, 128, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("aqua", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("fuchsia", [255, 0, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("silver", [192, 192, 192]),
    ("maroon", [128, 0, 0]),
    ("olive", [128, 128, 0]),
    ("teal", [0, 128, 128]),
    ("navy", [0, 0, 128]),
    ("purple", [128, 0, 128]),
    ("orange", [255, 165, 0]),
    ("brown", [165, 42, 42]),
    ("pink", [255, 192, 203]),
    ("gold", [255, 215, 0]),
    ("darkgreen", [0, 100, 0]),
    ("darkblue", [0, 0, 139]),
    ("darkred", [139, 0, 0]),
    ("lightblue", [173, 216, 230]),
    ("lightgreen", [144, 238, 144]),
    ("skyblue", [135, 206, 235]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("beige", [245, 245, 220]),
    ("khaki", [240, 230, 140]),
    ("coral", [255, 127, 80]),
    ("crimson", [220, 20, 60]),
    ("indigo", [75, 0, 130]),
    ("violet", [238, 130, 238]),
    ("turquoise", [64, 224, 208]),
    ("forestgreen", [34, 139, 34]),
    ("saddlebrown", [139, 69, 19]),
];

/// Look up a lowercase CSS color keyword.
pub(crate) fn lookup(name: &str) -> Option<Rgba> {
    if name == "transparent" {
        return Some(Rgba::TRANSPARENT);
    }
    CSS_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [r, g, b])| Rgba::from_bytes(*r, *g, *b, 255))
}

const BLACKWHITE: &[(f64, &str)] = &[(0.0, "#000000"), (1.0, "#ffffff")];
const WHITEBLACK: &[(f64, &str)] = &[(0.0, "#ffffff"), (1.0, "#000000")];
const BLUERED: &[(f64, &str)] = &[(0.0, "#0000ff"), (1.0, "#ff0000")];
const REDBLUE: &[(f64, &str)] = &[(0.0, "#ff0000"), (1.0, "#0000ff")];
const HOT: &[(f64, &str)] = &[(0.0, "#000000"), (0.3, "#e60000"), (0.6, "#ffd200"), (1.0, "#ffffff")];
const JET: &[(f64, &str)] = &[
    (0.0, "#000083"),
    (0.125, "#003caa"),
    (0.375, "#05ffff"),
    (0.625, "#ffff00"),
    (0.875, "#fa0000"),
    (1.0, "#800000"),
];
const RAINBOW: &[(f64, &str)] = &[
    (0.0, "#96005a"),
    (0.111, "#0000c8"),
    (0.222, "#0019ff"),
    (0.333, "#0098ff"),
    (0.444, "#2cff96"),
    (0.555, "#97ff00"),
    (0.666, "#ffea00"),
    (0.777, "#ff6f00"),
    (1.0, "#ff0000"),
];
const VIRIDIS: &[&str] = &[
    "#440154", "#472d7b", "#3b528b", "#2c728e", "#21918c", "#28ae80", "#5ec962", "#addc30", "#fde725",
];
const INFERNO: &[&str] = &[
    "#000004", "#1b0c41", "#4a0c6b", "#781c6d", "#a52c60", "#cf4446", "#ed6925", "#fb9b06", "#f7d13d", "#fcffa4",
];
const MAGMA: &[&str] = &[
    "#000004", "#180f3d", "#440f76", "#721f81", "#9e2f7f", "#cd4071", "#f1605d", "#fd9668", "#feca8d", "#fcfdbf",
];
const PLASMA: &[&str] = &[
    "#0d0887", "#46039f", "#7201a8", "#9c179e", "#bd3786", "#d8576b", "#ed7953", "#fb9f3a", "#fdca26", "#f0f921",
];

/// Names accepted by [`scale`].
pub const SCALE_NAMES: &[&str] = &[
    "blackwhite", "whiteblack", "greys", "bluered", "redblue", "hot", "jet", "rainbow", "viridis", "inferno", "magma",
    "plasma",
];

/// Stops of a named color scale, positioned in `0..=1`.
#[must_use]
pub fn scale(name: &str) -> Option<Vec<(f64, Rgba)>> {
    let positioned = |stops: &[(f64, &str)]| -> Option<Vec<(f64, Rgba)>> {
        stops.iter().map(|&(t, c)| Rgba::parse(c).ok().map(|rgba| (t, rgba))).collect()
    };
    let even = |colors: &[&str]| -> Option<Vec<(f64, Rgba)>> {
        let last = colors.len().saturating_sub(1).max(1) as f64;
        colors
            .iter()
            .enumerate()
            .map(|(i, c)| Rgba::parse(c).ok().map(|rgba| (i as f64 / last, rgba)))
            .collect()
    };
    match name.to_ascii_lowercase().as_str() {
        "blackwhite" | "greys" | "grayscale" => positioned(BLACKWHITE),
        "whiteblack" => positioned(WHITEBLACK),
        "bluered" => positioned(BLUERED),
        "redblue" => positioned(REDBLUE),
        "hot" => positioned(HOT),
        "jet" => positioned(JET),
        "rainbow" => positioned(RAINBOW),
        "viridis" => even(VIRIDIS),
        "inferno" => even(INFERNO),
        "magma" => even(MAGMA),
        "plasma" => even(PLASMA),
        _ => None,
    }
}
