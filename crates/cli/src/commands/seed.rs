//! Seed the database with starter categories.

use tracing::info;

use marketplace_api::db::{CategoryRepository, RepositoryError};
use marketplace_api::models::CategoryInput;

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Electronics", "Phones, computers, and accessories"),
    ("Home & Kitchen", "Cookware, furniture, and decor"),
    ("Fashion", "Clothing, shoes, and jewelry"),
    ("Books", "Printed books and e-readers"),
    ("Sports & Outdoors", "Fitness gear and camping equipment"),
    ("Beauty", "Skincare, makeup, and fragrances"),
];

/// Insert the default categories, skipping any that already exist.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails for a
/// reason other than a duplicate name.
pub async fn categories() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let repo = CategoryRepository::new(&pool);

    let mut inserted = 0;
    let mut skipped = 0;
    for (name, description) in DEFAULT_CATEGORIES {
        let input = CategoryInput {
            name: (*name).to_string(),
            description: Some((*description).to_string()),
            image: None,
        };
        match repo.create(&input).await {
            Ok(category) => {
                info!("  created {} (ID {})", category.name, category.id);
                inserted += 1;
            }
            Err(RepositoryError::Conflict(_)) => skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!("Seeding complete!");
    info!("  Categories inserted: {inserted}");
    info!("  Categories skipped (already exist): {skipped}");
    Ok(())
}
