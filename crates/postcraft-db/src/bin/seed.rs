//! # Seed Data Generator
//!
//! Populates a development database with the plan catalog, a handful of
//! coupons, and a demo user with a few scheduled posts.
//!
//! ## Usage
//! ```bash
//! cargo run -p postcraft-db --bin seed
//! cargo run -p postcraft-db --bin seed -- --db ./data/postcraft.db
//! ```

use chrono::{Duration, Utc};
use std::env;

use postcraft_core::{Coupon, DiscountKind, NewScheduledPost, Plan};
use postcraft_db::{Database, DbConfig};

/// (id, name, price in paise, duration days, features)
const PLANS: &[(&str, &str, i64, i64, &[&str])] = &[
    (
        "starter",
        "Starter",
        29_900,
        30,
        &["10 AI drafts / month", "Post scheduling"],
    ),
    (
        "pro",
        "Pro",
        79_900,
        30,
        &["Unlimited AI drafts", "Post scheduling", "Image posts", "Analytics"],
    ),
    (
        "pro-annual",
        "Pro (Annual)",
        799_000,
        365,
        &["Everything in Pro", "Two months free"],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./postcraft_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Postcraft Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./postcraft_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Postcraft Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    // Plans are upserted, so re-running refreshes prices.
    for (id, name, price, duration_days, features) in PLANS {
        let plan = Plan {
            id: id.to_string(),
            name: name.to_string(),
            price: *price,
            duration_days: *duration_days,
            features: features.iter().map(|f| f.to_string()).collect(),
            is_active: true,
        };
        db.plans().upsert(&plan).await?;
        println!("  {:<10} ₹{}", plan.id, plan.price());
    }
    println!("✓ {} plans", PLANS.len());

    if db.coupons().get_by_code("LAUNCH50").await?.is_some() {
        println!("⚠ Coupons already seeded, skipping the rest.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    let mut launch = Coupon::new(
        "LAUNCH50",
        DiscountKind::Percentage,
        50,
        now - Duration::days(1),
        now + Duration::days(90),
    );
    launch.max_discount = Some(30_000);
    launch.usage_limit = Some(500);

    let mut flat = Coupon::new(
        "FLAT200",
        DiscountKind::Fixed,
        20_000,
        now - Duration::days(1),
        now + Duration::days(30),
    );
    flat.min_amount = Some(50_000);

    let mut annual = Coupon::new(
        "ANNUAL10",
        DiscountKind::Percentage,
        10,
        now - Duration::days(1),
        now + Duration::days(365),
    );
    annual.applicable_plans = vec!["pro-annual".to_string()];

    let expired = Coupon::new(
        "DIWALI",
        DiscountKind::Percentage,
        25,
        now - Duration::days(60),
        now - Duration::days(30),
    );

    for coupon in [&launch, &flat, &annual, &expired] {
        db.coupons().insert(coupon).await?;
    }
    println!("✓ 4 coupons (LAUNCH50, FLAT200, ANNUAL10, DIWALI expired)");

    db.users().insert("demo-user", "Demo User").await?;
    db.users()
        .link_social_account(
            "demo-user",
            "dev-access-token",
            Some(now + Duration::days(60)),
            "demo-member-id",
        )
        .await?;

    let drafts = [
        ("Why I write every morning", Duration::minutes(-5)),
        ("Three hiring mistakes I made", Duration::hours(4)),
        ("What shipping weekly taught us", Duration::days(1)),
    ];
    for (title, offset) in drafts {
        let post = NewScheduledPost {
            user_id: "demo-user".to_string(),
            title: Some(title.to_string()),
            content: format!("{title}\n\nA short story, and the lesson I took from it."),
            image_ref: None,
            scheduled_at: now + offset,
        };
        db.scheduled_posts().insert(&post, now).await?;
    }
    println!("✓ Demo user with 3 scheduled posts (1 already due)");

    println!();
    println!("Done.");
    Ok(())
}
