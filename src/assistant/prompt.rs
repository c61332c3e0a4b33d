//! 提示词与兜底回复

use super::Location;

const PERSONA: &str = "You are a friendly and knowledgeable AI travel assistant specializing in the Philippines. \
You help tourists discover Philippine culture, traditions, local cuisine, festivals, and travel tips. \
Provide helpful, accurate, and engaging information about Philippine destinations, attractions, and local experiences. \
Keep responses concise but informative (2-4 paragraphs maximum).";

const DEFAULT_NAME: &str = "this location";
const DEFAULT_REGION: &str = "Philippines";

/// 系统提示词: 固定人设 + 地点上下文
pub fn system_prompt(location: Option<&Location>) -> String {
    let mut prompt = PERSONA.to_string();
    match location {
        Some(Location::Detailed(details)) => {
            let name = details.name.as_deref().unwrap_or(DEFAULT_NAME);
            let region = details.region.as_deref().unwrap_or(DEFAULT_REGION);
            prompt.push_str(&format!(
                "\n\nThe user is asking about {} in {}, Philippines.",
                name, region
            ));
            if let Some(address) = details.full_address.as_deref().filter(|a| !a.is_empty()) {
                prompt.push_str(&format!("\nFull location: {}", address));
            }
            if details.is_custom {
                prompt.push_str(
                    "\nThis is a dynamically discovered location - provide general information about this area and nearby attractions.",
                );
            }
        }
        Some(Location::Named(name)) => {
            prompt.push_str(&format!(
                "\n\nThe user is currently asking about {} in the Philippines.",
                name
            ));
        }
        None => {}
    }
    prompt
}

const FOOD_WORDS: &[&str] = &["food", "eat", "cuisine", "dish"];
const FESTIVAL_WORDS: &[&str] = &["festival", "celebration", "event"];
const BEACH_WORDS: &[&str] = &["beach", "island", "dive", "swim"];

/// 兜底回复: 有地点时介绍地点, 否则按关键词分组选择
pub fn fallback_text(message: &str, location: Option<&Location>) -> String {
    let (name, region) = match location {
        Some(Location::Detailed(details)) => (
            Some(details.name.as_deref().unwrap_or(DEFAULT_NAME)),
            Some(details.region.as_deref().unwrap_or(DEFAULT_REGION)),
        ),
        Some(Location::Named(name)) if !name.is_empty() => (Some(name.as_str()), None),
        _ => (None, None),
    };
    if let Some(name) = name {
        return format!(
            "{} is a wonderful destination in {}! It offers rich cultural experiences, beautiful scenery, and warm hospitality. \
Would you like to know about specific attractions, local food, festivals, or travel tips for this area?",
            name,
            region.unwrap_or("the Philippines")
        );
    }

    let lower = message.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if mentions(FOOD_WORDS) {
        return "Philippine cuisine is diverse and delicious! Popular dishes include Adobo (savory stew), Sinigang (sour soup), \
Lechon (roasted pig), Pancit (noodles), and Halo-halo (dessert). Each region has its own specialties. \
What specific dish or region would you like to explore?"
            .to_string();
    }
    if mentions(FESTIVAL_WORDS) {
        return "The Philippines celebrates numerous colorful festivals! Major ones include Sinulog in Cebu (January), \
Ati-Atihan in Aklan (January), Panagbenga in Baguio (February), and MassKara in Bacolod (October). \
These festivals showcase Filipino culture through music, dance, and vibrant costumes!"
            .to_string();
    }
    if mentions(BEACH_WORDS) {
        return "The Philippines is famous for its stunning beaches! Top destinations include Boracay (white sand), \
Palawan (lagoons and limestone cliffs), Siargao (surfing), Bohol (diving), and Bantayan Island (peaceful getaway). \
The clear waters are perfect for diving, snorkeling, and island hopping!"
            .to_string();
    }

    "Welcome to the Philippines! This beautiful country offers pristine beaches, rich cultural heritage, delicious cuisine, \
and warm hospitality. From Manila's historic sites to Palawan's natural wonders, there's so much to discover. \
What would you like to explore?"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::LocationDetails;

    #[test]
    fn test_prompt_with_detailed_location() {
        let location = Location::Detailed(LocationDetails {
            name: Some("Vigan".into()),
            region: Some("Ilocos Sur".into()),
            full_address: Some("Calle Crisologo, Vigan".into()),
            is_custom: true,
            ..Default::default()
        });
        let prompt = system_prompt(Some(&location));
        assert!(prompt.contains("The user is asking about Vigan in Ilocos Sur, Philippines."));
        assert!(prompt.contains("Full location: Calle Crisologo, Vigan"));
        assert!(prompt.contains("dynamically discovered location"));
    }

    #[test]
    fn test_prompt_with_plain_location() {
        let prompt = system_prompt(Some(&Location::Named("Cebu".into())));
        assert!(prompt.ends_with("The user is currently asking about Cebu in the Philippines."));
        assert_eq!(system_prompt(None), PERSONA);
    }

    #[test]
    fn test_fallback_keyword_groups() {
        assert!(fallback_text("Where should I EAT?", None).starts_with("Philippine cuisine"));
        assert!(fallback_text("any festival soon", None).contains("Sinulog"));
        assert!(fallback_text("best place to dive", None).contains("Boracay"));
        assert!(fallback_text("hello", None).starts_with("Welcome to the Philippines!"));
    }

    #[test]
    fn test_fallback_prefers_location() {
        let text = fallback_text("food?", Some(&Location::Named("Bohol".into())));
        assert!(text.starts_with("Bohol is a wonderful destination in the Philippines!"));

        let detailed = Location::Detailed(LocationDetails {
            name: Some("Siargao".into()),
            region: Some("Surigao del Norte".into()),
            ..Default::default()
        });
        assert!(fallback_text("", Some(&detailed)).contains("in Surigao del Norte!"));
    }
}
