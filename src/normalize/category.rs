//! Keyword taxonomy for wardrobe categories.
//!
//! Matching is whole-word and case-insensitive over the item's combined
//! name, brand, colour and retailer text. Gendered categories are skipped
//! when the text signals the other gender. Entries are tried in order, so
//! more specific categories sit above generic ones.

use std::sync::LazyLock;

use regex::Regex;

pub const UNCATEGORIZED: &str = "Uncategorized";

const TAXONOMY: &[(&str, &[&str])] = &[
    // Menswear
    ("T-Shirts", &["t-shirt", "t shirt", "tshirt", "tee", "tees", "crew neck t-shirt", "v-neck t-shirt"]),
    ("Casual Shirts", &["casual shirt", "linen shirt", "oxford shirt", "chambray shirt", "button-down", "button down", "flannel shirt", "overshirt"]),
    ("Formal Shirts", &["formal shirt", "dress shirt", "business shirt", "office shirt", "slim fit shirt", "regular fit shirt"]),
    ("Sweatshirts", &["sweatshirt", "hoodie", "hooded sweatshirt", "zip-up sweatshirt"]),
    ("Sweaters", &["sweater", "pullover", "cardigan", "jumper", "knit", "wool sweater", "cashmere sweater"]),
    ("Jackets", &["jacket", "bomber", "trucker jacket", "denim jacket", "leather jacket", "windbreaker", "rain jacket"]),
    ("Blazers & Coats", &["blazer", "coat", "suit jacket", "overcoat", "trench coat", "peacoat", "sport coat"]),
    ("Mens Jeans", &["men jeans", "slim fit jeans", "straight fit jeans", "straight-leg jeans", "regular fit jeans", "skinny jeans", "bootcut jeans", "tapered jeans"]),
    ("Casual Trousers", &["trouser", "trousers", "chinos", "khakis", "casual pant", "cargo pant", "cotton pant", "linen pant"]),
    ("Mens Shorts", &["men short", "bermuda", "cargo short", "denim short", "chino short", "swim trunk"]),
    ("Track Pants & Joggers", &["track pant", "jogger", "sweatpant", "athletic pant", "running pant", "training pant"]),
    // Womenswear
    ("Dresses", &["dress", "gown", "maxi", "midi dress", "bodycon", "shift dress", "wrap dress", "cocktail dress"]),
    ("Womens Tops", &["women top", "ladies top", "blouse", "crop top", "camisole", "tank top", "tunic", "kurta"]),
    ("Womens Jeans", &["women jeans", "ladies jeans", "skinny jeans", "boyfriend jeans", "mom jeans", "high-waisted jeans", "wide leg jeans"]),
    ("Skirts", &["skirt", "mini skirt", "midi skirt", "maxi skirt", "pleated skirt", "pencil skirt"]),
    ("Womens Shorts", &["women short", "ladies short", "high waisted short"]),
    // Footwear
    ("Mens Casual Shoes", &["men casual shoe", "sneaker", "espadrille", "canvas shoe", "loafer", "boat shoe", "slip-on"]),
    ("Womens Casual Shoes", &["women casual shoe", "ladies sneaker", "ballet flat", "walking shoe"]),
    ("Formal Shoes", &["formal shoe", "oxford", "brogue", "derby", "dress shoe", "monk strap"]),
    ("Heels", &["heel", "stiletto", "pump", "wedge", "block heel", "kitten heel"]),
    ("Boots", &["boot", "ankle boot", "chelsea boot", "combat boot", "hiking boot"]),
    ("Sandals & Floaters", &["sandal", "floater", "slider", "flip flop"]),
    // Accessories
    ("Bags & Backpacks", &["bag", "backpack", "laptop bag", "messenger bag", "duffel bag", "tote", "handbag"]),
    ("Watches", &["watch", "wristwatch", "smartwatch", "chronograph"]),
    ("Sunglasses", &["sunglass", "eyeglass", "spectacle", "aviator", "wayfarer"]),
    ("Belts", &["belt", "leather belt", "woven belt", "braided belt"]),
    ("Wallets", &["wallet", "card holder", "money clip", "billfold"]),
];

static COMPILED: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    TAXONOMY
        .iter()
        .map(|(category, keywords)| {
            let patterns = keywords
                .iter()
                .map(|keyword| {
                    let parts: Vec<String> = keyword
                        .split_whitespace()
                        .map(|p| format!(r"\b{}\b", regex::escape(p)))
                        .collect();
                    Regex::new(&format!("(?i){}", parts.join(r"\s+"))).expect("regex")
                })
                .collect();
            (*category, patterns)
        })
        .collect()
});

static WOMENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(women|womens|ladies|girl)\b").expect("regex"));
static MENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(men|mens|boy)\b").expect("regex"));

/// Pick a wardrobe category for an item. `text` should combine whatever is
/// known: name, brand, colour, retailer.
pub fn categorize(text: &str) -> String {
    let womens = WOMENS.is_match(text);
    let mens = MENS.is_match(text);

    for (category, patterns) in COMPILED.iter() {
        let gender_blocked = (womens && category.starts_with("Mens"))
            || (mens
                && (category.starts_with("Womens") || *category == "Dresses" || *category == "Skirts"));
        if gender_blocked {
            continue;
        }
        if patterns.iter().any(|p| p.is_match(text)) {
            return (*category).to_string();
        }
    }

    // Generic fallbacks before giving up.
    let lower = text.to_lowercase();
    if lower.contains("shoe") || lower.contains("sneaker") || lower.contains("footwear") {
        return if womens { "Womens Casual Shoes" } else { "Mens Casual Shoes" }.to_string();
    }
    if lower.contains("jean") || lower.contains("denim") {
        return if womens { "Womens Jeans" } else { "Mens Jeans" }.to_string();
    }
    if lower.contains("shirt") || lower.contains("top") {
        return if womens {
            "Womens Tops".to_string()
        } else if lower.contains("formal") || lower.contains("business") {
            "Formal Shirts".to_string()
        } else {
            "Casual Shirts".to_string()
        };
    }

    UNCATEGORIZED.to_string()
}
