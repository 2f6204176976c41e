//! Fixed style catalog and mockup presets.

use serde::Serialize;

/// How a style turns into a generation instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    /// Catalog preset with a fixed prompt template.
    Preset { prompt: &'static str },
    /// Free-text prompt written by the user.
    Custom,
    /// Background / lighting / props form.
    Manual,
    /// Reference image whose look is transferred to the product.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleOption {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub category: &'static str,
    pub kind: StyleKind,
}

impl StyleOption {
    pub fn is_creative_tool(&self) -> bool {
        !matches!(self.kind, StyleKind::Preset { .. })
    }
}

/// Eligible (id, display name) pair offered to the recommendation advisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleCandidate {
    pub id: String,
    pub name: String,
}

const fn preset(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    category: &'static str,
    prompt: &'static str,
) -> StyleOption {
    StyleOption { id, name, description, icon, category, kind: StyleKind::Preset { prompt } }
}

pub static STYLE_OPTIONS: &[StyleOption] = &[
    preset(
        "studio-white", "Clean Studio", "Pure white seamless backdrop, e-commerce ready", "camera", "general",
        "Place the product on a pure white seamless studio background with soft, even lighting and a subtle natural shadow beneath it. Sharp focus, high resolution, e-commerce catalog quality.",
    ),
    preset(
        "lifestyle", "Lifestyle", "The product in a warm, lived-in home setting", "home", "general",
        "Place the product in a bright, modern lifestyle setting such as a tidy living room or kitchen counter. Warm natural window light, shallow depth of field, inviting and authentic mood.",
    ),
    preset(
        "flat-lay", "Flat Lay", "Top-down arrangement with complementary items", "squares", "general",
        "Create a top-down flat lay composition with the product as the centerpiece, surrounded by a few complementary items on a textured neutral surface. Even soft light, balanced negative space.",
    ),
    preset(
        "luxury", "Luxury", "Dark marble, gold accents, premium feel", "gem", "general",
        "Present the product on polished dark marble with subtle gold accents. Low-key dramatic lighting with elegant reflections, luxurious and sophisticated mood.",
    ),
    preset(
        "nature", "Outdoor Nature", "Moss, stone and dappled sunlight", "leaf", "general",
        "Place the product outdoors on natural stone surrounded by moss and leaves. Dappled golden-hour sunlight, fresh and organic atmosphere, crisp product detail.",
    ),
    preset(
        "minimal-pastel", "Minimal Pastel", "Soft pastel blocks and geometric podiums", "shapes", "general",
        "Place the product on a geometric podium against a soft pastel background with simple shapes. Clean minimalist composition, soft diffused light, modern and playful.",
    ),
    preset(
        "food-rustic", "Rustic Food", "Wooden table, fresh ingredients, cozy light", "utensils", "food",
        "Style the product on a rustic wooden table with fresh ingredients scattered around it. Warm side lighting, appetizing colors, editorial food photography.",
    ),
    preset(
        "beverage-splash", "Beverage Splash", "Dynamic liquid splash and droplets", "droplet", "beverage",
        "Show the product with a dynamic frozen splash of liquid and fresh condensation droplets. High-speed photography look, vivid backlighting, refreshing and energetic.",
    ),
    preset(
        "cosmetics-spa", "Spa Cosmetics", "Water ripples, stones and botanicals", "sparkles", "cosmetics",
        "Place the product beside calm water ripples, smooth stones and fresh botanicals. Soft diffused light, serene spa atmosphere, clean luxurious skincare aesthetic.",
    ),
    preset(
        "tech-neon", "Tech Neon", "Dark backdrop with neon rim light", "cpu", "electronics",
        "Present the product on a dark reflective surface with cyan and magenta neon rim lighting. Futuristic, sleek and high-tech mood, crisp reflections.",
    ),
    preset(
        "fashion-editorial", "Fashion Editorial", "Magazine-style styling and bold color", "shirt", "fashion",
        "Create a high-fashion editorial shot featuring the product with bold color blocking and strong directional light. Magazine cover quality, confident and stylish.",
    ),
    preset(
        "festive", "Festive", "Holiday lights, ribbons and gift wrap", "gift", "seasonal",
        "Place the product in a festive holiday scene with warm bokeh lights, ribbons and wrapped gifts. Cozy celebratory mood, rich warm tones.",
    ),
    StyleOption {
        id: "custom", name: "Custom Prompt", description: "Describe the scene in your own words",
        icon: "pencil", category: "creative", kind: StyleKind::Custom,
    },
    StyleOption {
        id: "manual", name: "Manual Setup", description: "Pick the background, lighting and props",
        icon: "wrench", category: "creative", kind: StyleKind::Manual,
    },
    StyleOption {
        id: "reference", name: "Reference Image", description: "Match the look of a photo you like",
        icon: "book", category: "creative", kind: StyleKind::Reference,
    },
];

pub fn find_style(id: &str) -> Option<&'static StyleOption> {
    STYLE_OPTIONS.iter().find(|s| s.id == id)
}

/// Catalog entries the advisor may recommend; the creative tools are never candidates.
pub fn eligible_candidates() -> Vec<StyleCandidate> {
    STYLE_OPTIONS
        .iter()
        .filter(|s| !s.is_creative_tool())
        .map(|s| StyleCandidate { id: s.id.to_string(), name: s.name.to_string() })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockupOption {
    pub id: &'static str,
    pub name: &'static str,
    pub prompt: &'static str,
}

pub static MOCKUP_OPTIONS: &[MockupOption] = &[
    MockupOption {
        id: "tshirt",
        name: "T-Shirt",
        prompt: "Place the provided product image realistically onto the front of a plain white t-shirt worn by a young adult model in a bright, outdoor urban setting. The product image should look like a high-quality print. The model should have a neutral expression.",
    },
    MockupOption {
        id: "billboard",
        name: "Billboard",
        prompt: "Place the provided product image onto a large billboard on the side of a modern skyscraper in a bustling city like Tokyo or New York at dusk. The billboard should be illuminated, and the scene should have a cinematic, slightly futuristic feel.",
    },
    MockupOption {
        id: "phone",
        name: "Phone Screen",
        prompt: "Show the provided product image on the screen of a modern, sleek smartphone. The phone is being held by a person's hand against a blurred background of a trendy cafe. The screen should be bright and clear.",
    },
];

pub fn find_mockup(id: &str) -> Option<&'static MockupOption> {
    MOCKUP_OPTIONS.iter().find(|m| m.id == id)
}
