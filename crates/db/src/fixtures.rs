//! Demo menu used by `tably seed` and the integration tests.

use rust_decimal::Decimal;

use tably_core::domain::menu::{MenuItem, MenuItemId};

use crate::repositories::{CatalogRepository, RepositoryError};

/// (id, name, price in cents, description, popularity, tags)
const DEMO_MENU: &[(i64, &str, i64, &str, u32, &[&str])] = &[
    (1, "Spicy Vegan Pad Thai", 1250, "Rice noodles, tofu, chili, peanuts", 90,
        &["thai", "vegan", "spicy", "noodles"]),
    (2, "Chili Miso Ramen", 1300, "Rich miso broth, chili oil", 80,
        &["japanese", "spicy", "soup"]),
    (3, "Margherita Pizza", 1100, "Tomato, mozzarella, basil", 75,
        &["italian", "vegetarian", "pizza"]),
    (4, "Grilled Chicken Bowl", 1450, "Chicken, brown rice, veggies", 70,
        &["american", "high-protein", "gluten-free", "bowl", "grilled"]),
    (5, "Mediterranean Falafel Wrap", 1050, "Falafel, hummus, pickles", 65,
        &["mediterranean", "vegetarian", "wrap", "dairy-free"]),
    (6, "Classic Caesar Salad", 950, "Romaine, parmesan, croutons", 50,
        &["american", "salad"]),
    (7, "Keto Power Bowl", 1400, "Steak, greens, avocado", 60,
        &["american", "keto", "low-carb", "high-protein", "gluten-free", "bowl"]),
    (8, "Quinoa Veggie Bowl", 1200, "Quinoa, roasted veg, tahini", 55,
        &["vegetarian", "gluten-free", "bowl"]),
    (9, "Spicy Tofu Buddha Bowl", 1275, "Tofu, chili crunch, veggies", 58,
        &["vegan", "spicy", "bowl", "dairy-free"]),
    (10, "Chicken Avocado Salad", 1225, "Greens, chicken, avocado", 52,
        &["gluten-free", "high-protein", "salad"]),
    (11, "Berry Chia Pudding", 650, "Almond milk, chia, berries", 35,
        &["vegan", "dessert", "dairy-free", "nut-free"]),
    (12, "Butter Chicken", 1375, "Creamy tomato gravy, rice", 85,
        &["indian", "mild", "rice"]),
    (13, "Paneer Tikka Wrap", 1125, "Marinated paneer, peppers", 62,
        &["indian", "vegetarian", "wrap"]),
    (14, "Chana Masala", 1075, "Chickpeas in spicy sauce", 68,
        &["indian", "vegan", "spicy", "rice"]),
    (15, "Tandoori Chicken", 1425, "Yogurt-spiced, grilled", 66,
        &["indian", "grilled", "high-protein", "spicy"]),
    (16, "Lamb Biryani", 1500, "Fragrant rice, spices", 64,
        &["indian", "spicy", "rice"]),
    (17, "Chicken Tacos", 975, "Soft tortillas, salsa", 60,
        &["mexican", "wrap", "mild"]),
    (18, "Veggie Quesadilla", 925, "Cheese, peppers, onions", 48,
        &["mexican", "vegetarian"]),
    (19, "Chipotle Bowl", 1195, "Chicken, beans, chipotle", 72,
        &["mexican", "spicy", "bowl", "high-protein"]),
    (20, "Fettuccine Alfredo", 1250, "Creamy parmesan sauce", 74,
        &["italian", "vegetarian"]),
    (21, "Penne al Pesto", 1225, "Basil pesto, parmesan", 63,
        &["italian", "vegetarian"]),
    (22, "Spicy Arrabbiata", 1150, "Tomato chili sauce", 59,
        &["italian", "spicy", "noodles"]),
    (23, "Gluten-Free Lasagna", 1395, "Layered veggies, ricotta", 57,
        &["italian", "gluten-free", "vegetarian"]),
    (24, "Salmon Nigiri Set", 1650, "8 pcs nigiri, wasabi", 77,
        &["japanese", "seafood", "high-protein", "gluten-free", "rice"]),
    (25, "Spicy Tuna Roll", 1225, "Tuna, chili mayo", 73,
        &["japanese", "seafood", "spicy", "rice"]),
    (26, "Veggie Uramaki", 1095, "Avocado, cucumber, carrot", 61,
        &["japanese", "vegetarian", "dairy-free"]),
    (27, "Miso Soup", 395, "Classic comfort broth", 40,
        &["japanese", "soup", "vegetarian"]),
];

pub fn demo_menu() -> Vec<MenuItem> {
    DEMO_MENU
        .iter()
        .map(|(id, name, price_minor, description, popularity, tags)| MenuItem {
            id: MenuItemId(*id),
            name: (*name).to_string(),
            description: (*description).to_string(),
            price: Decimal::new(*price_minor, 2),
            is_available: true,
            tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
            popularity: *popularity,
        })
        .collect()
}

/// Upserts the demo menu. Safe to run repeatedly.
pub async fn seed_demo_menu(catalog: &dyn CatalogRepository) -> Result<usize, RepositoryError> {
    let items = demo_menu();
    let count = items.len();
    for item in items {
        catalog.upsert(item).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::demo_menu;

    #[test]
    fn demo_menu_ids_are_unique_and_priced() {
        let items = demo_menu();
        let mut ids: Vec<i64> = items.iter().map(|item| item.id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), items.len());
        assert!(items.iter().all(|item| item.price.is_sign_positive()));
    }

    #[test]
    fn demo_menu_covers_the_headline_facets() {
        let items = demo_menu();
        for tag in ["vegan", "spicy", "gluten-free", "thai", "japanese"] {
            assert!(
                items.iter().any(|item| item.has_tag(tag)),
                "no demo item tagged `{tag}`"
            );
        }
    }
}
