//! SeaORM store and directory against migrated SQLite.

use chrono::{DateTime, Duration, TimeZone, Utc};
use crm_billing::billing::sea_orm_directory::entity::{
    company, company_user, contact, project, workspace,
};
use crm_billing::billing::types::{ItemUpdate, ProfileUpdate};
use crm_billing::billing::{
    BillingHistory, BillingStore, BillingTrigger, BillingType, CountBase, CountType, CrmDirectory,
    HistoryStatus, LedgerInsert, SeaOrmBillingStore, SeaOrmCrmDirectory,
};
use crm_billing::testing::{TestDb, fixtures};
use rust_decimal_macros::dec;
use sea_orm::{DatabaseConnection, EntityTrait, IntoActiveModel};
use uuid::Uuid;

fn history_row(company_id: &str, status: HistoryStatus, generated_at: DateTime<Utc>) -> BillingHistory {
    BillingHistory {
        id: Uuid::new_v4(),
        company_id: company_id.to_string(),
        billing_month: 3,
        billing_year: 2024,
        admcloud_doc_id: None,
        admcloud_doc_number: None,
        proforma_number: "PRO-202403-acme01".to_string(),
        status,
        trigger: BillingTrigger::Scheduled,
        generated_at,
        sent_at: (status == HistoryStatus::Sent).then_some(generated_at),
        pdf_url: Some("https://files.test/p.pdf".to_string()),
        subtotal: dec!(90),
        tax_amount: dec!(0),
        total: dec!(90),
        currency: "USD".to_string(),
        recipients: vec!["ana@acme.test".to_string()],
        cc: vec!["finance@provider.test".to_string()],
        error_message: None,
        items_snapshot: serde_json::json!([{ "code": "CRM-USERS", "quantity": "6" }]),
    }
}

fn march(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn workspace_model(id: &str, enabled: bool, sender: Option<&str>) -> workspace::Model {
    workspace::Model {
        id: id.to_string(),
        name: format!("Workspace {id}"),
        legal_name: None,
        address: None,
        phone: None,
        logo_url: None,
        tax_id: None,
        billing_enabled: enabled,
        billing_sender_email: sender.map(str::to_string),
        billing_email_subject: None,
        billing_email_body: None,
        billing_cc: Some("a@provider.test, b@provider.test".to_string()),
        admcloud_enabled: false,
        admcloud_app_id: None,
        admcloud_company: None,
        admcloud_username: None,
        admcloud_password: None,
        admcloud_payment_term_id: None,
        admcloud_sales_stage_id: None,
        bank_transfer: None,
        proforma_notes: None,
    }
}

fn company_model(id: &str, workspace_id: &str, name: &str, status: &str) -> company::Model {
    company::Model {
        id: id.to_string(),
        workspace_id: workspace_id.to_string(),
        name: name.to_string(),
        legal_name: None,
        rnc: Some("131-00000-1".to_string()),
        fiscal_address: None,
        status: status.to_string(),
        admcloud_relationship_id: None,
    }
}

async fn insert_workspace(db: &DatabaseConnection, model: workspace::Model) {
    workspace::Entity::insert(model.into_active_model())
        .exec_without_returning(db)
        .await
        .unwrap();
}

async fn insert_company(db: &DatabaseConnection, model: company::Model) {
    company::Entity::insert(model.into_active_model())
        .exec_without_returning(db)
        .await
        .unwrap();
}

async fn insert_contact(
    db: &DatabaseConnection,
    company_id: &str,
    email: Option<&str>,
    receives_invoices: bool,
    created_at: DateTime<Utc>,
) {
    let model = contact::Model {
        id: fixtures::fake::id("ct"),
        company_id: company_id.to_string(),
        name: "Contact".to_string(),
        email: email.map(str::to_string),
        receives_invoices,
        created_at: created_at.fixed_offset(),
    };
    contact::Entity::insert(model.into_active_model())
        .exec_without_returning(db)
        .await
        .unwrap();
}

// ============================================================================
// Billing store
// ============================================================================

#[tokio::test]
async fn test_profile_is_created_with_defaults_and_updated() {
    let db = TestDb::new().await.unwrap();
    let store = SeaOrmBillingStore::new(db.connection());

    let profile = store.get_or_create_profile("cmp_1").await.unwrap();
    assert_eq!(profile.billing_day, 1);
    assert_eq!(profile.billing_type, BillingType::Standard);
    assert!(!profile.auto_billing_enabled);

    let updated = store
        .update_profile(
            "cmp_1",
            &ProfileUpdate {
                billing_day: Some(20),
                auto_billing_enabled: Some(true),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.billing_day, 20);
    assert!(updated.auto_billing_enabled);
    assert_eq!(updated.billing_type, BillingType::Standard);

    assert_eq!(store.get_or_create_profile("cmp_1").await.unwrap(), updated);
}

#[tokio::test]
async fn test_items_keep_positions_and_count_types() {
    let db = TestDb::new().await.unwrap();
    let store = SeaOrmBillingStore::new(db.connection());

    let users = store
        .add_item("cmp_1", &fixtures::users_item("USERS", dec!(15)))
        .await
        .unwrap();
    let extra = store
        .add_item(
            "cmp_1",
            &fixtures::calculated_item("EXTRA", CountBase::Projects, 2, dec!(7.25)),
        )
        .await
        .unwrap();
    store
        .add_item("cmp_2", &fixtures::manual_item("OTHER", dec!(1), dec!(1)))
        .await
        .unwrap();

    assert_eq!((users.position, extra.position), (0, 1));

    let items = store.list_items("cmp_1").await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].code, "USERS");
    assert_eq!(
        items[1].count_type,
        CountType::Calculated {
            base: CountBase::Projects,
            subtract: 2
        }
    );
    assert_eq!(items[1].unit_price, dec!(7.25));

    // Moving the calculated item to the front
    let moved = store
        .update_item(
            "cmp_1",
            extra.id,
            ItemUpdate {
                position: Some(0),
                count_type: Some(CountType::Manual { quantity: dec!(3) }),
                ..ItemUpdate::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.count_type, CountType::Manual { quantity: dec!(3) });
    store
        .update_item(
            "cmp_1",
            users.id,
            ItemUpdate {
                position: Some(1),
                ..ItemUpdate::default()
            },
        )
        .await
        .unwrap();
    let codes: Vec<String> = store
        .list_items("cmp_1")
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.code)
        .collect();
    assert_eq!(codes, vec!["EXTRA", "USERS"]);
}

#[tokio::test]
async fn test_items_are_scoped_to_their_company() {
    let db = TestDb::new().await.unwrap();
    let store = SeaOrmBillingStore::new(db.connection());
    let item = store
        .add_item("cmp_1", &fixtures::users_item("USERS", dec!(15)))
        .await
        .unwrap();

    let foreign = store
        .update_item("cmp_2", item.id, ItemUpdate::default())
        .await
        .unwrap();
    assert!(foreign.is_none());
    assert!(!store.remove_item("cmp_2", item.id).await.unwrap());

    assert!(store.remove_item("cmp_1", item.id).await.unwrap());
    assert!(!store.remove_item("cmp_1", item.id).await.unwrap());
    assert!(store.list_items("cmp_1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_one_sent_row_per_period() {
    let db = TestDb::new().await.unwrap();
    let store = SeaOrmBillingStore::new(db.connection());

    assert!(!store.has_sent_history("cmp_1", 3, 2024).await.unwrap());

    let failed = history_row("cmp_1", HistoryStatus::Failed, march(1, 8));
    assert_eq!(store.insert_history(&failed).await.unwrap(), LedgerInsert::Inserted);
    assert!(!store.has_sent_history("cmp_1", 3, 2024).await.unwrap());

    let sent = history_row("cmp_1", HistoryStatus::Sent, march(1, 9));
    assert_eq!(store.insert_history(&sent).await.unwrap(), LedgerInsert::Inserted);
    assert!(store.has_sent_history("cmp_1", 3, 2024).await.unwrap());

    let duplicate = history_row("cmp_1", HistoryStatus::Sent, march(1, 10));
    assert_eq!(store.insert_history(&duplicate).await.unwrap(), LedgerInsert::Conflict);

    // Other statuses and other periods are not constrained
    let pending = history_row("cmp_1", HistoryStatus::Pending, march(1, 11));
    assert_eq!(store.insert_history(&pending).await.unwrap(), LedgerInsert::Inserted);
    let mut april = history_row("cmp_1", HistoryStatus::Sent, march(1, 12));
    april.billing_month = 4;
    assert_eq!(store.insert_history(&april).await.unwrap(), LedgerInsert::Inserted);
}

#[tokio::test]
async fn test_history_round_trips_and_is_newest_first() {
    let db = TestDb::new().await.unwrap();
    let store = SeaOrmBillingStore::new(db.connection());

    let mut rows = Vec::new();
    for hour in 0..4 {
        let mut row = history_row("cmp_1", HistoryStatus::Failed, march(2, 8) + Duration::hours(hour));
        row.error_message = Some(format!("attempt {hour}"));
        store.insert_history(&row).await.unwrap();
        rows.push(row);
    }
    store
        .insert_history(&history_row("cmp_2", HistoryStatus::Failed, march(5, 8)))
        .await
        .unwrap();

    let listed = store.list_history("cmp_1", 3).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].error_message.as_deref(), Some("attempt 3"));
    assert_eq!(listed[2].error_message.as_deref(), Some("attempt 1"));

    let newest = &listed[0];
    let original = &rows[3];
    assert_eq!(newest.id, original.id);
    assert_eq!(newest.recipients, original.recipients);
    assert_eq!(newest.cc, original.cc);
    assert_eq!(newest.total, dec!(90));
    assert_eq!(newest.trigger, BillingTrigger::Scheduled);
    assert_eq!(newest.items_snapshot, original.items_snapshot);
}

// ============================================================================
// CRM directory
// ============================================================================

#[tokio::test]
async fn test_billing_workspaces_need_flag_and_sender() {
    let db = TestDb::new().await.unwrap();
    let conn = db.connection();
    insert_workspace(&conn, workspace_model("w1", true, Some("billing@w1.test"))).await;
    insert_workspace(&conn, workspace_model("w2", false, Some("billing@w2.test"))).await;
    insert_workspace(&conn, workspace_model("w3", true, None)).await;
    insert_workspace(&conn, workspace_model("w4", true, Some("   "))).await;

    let directory = SeaOrmCrmDirectory::new(conn);
    let workspaces = directory.billing_workspaces().await.unwrap();

    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].id, "w1");
    assert_eq!(
        workspaces[0].billing_cc,
        vec!["a@provider.test", "b@provider.test"]
    );
}

#[tokio::test]
async fn test_due_companies_match_day_workspace_and_status() {
    let db = TestDb::new().await.unwrap();
    let conn = db.connection();
    let store = SeaOrmBillingStore::new(conn.clone());

    insert_company(&conn, company_model("c_due", "w1", "Beta", "active_client")).await;
    insert_company(&conn, company_model("c_due2", "w1", "Alpha", "active_client")).await;
    insert_company(&conn, company_model("c_other_day", "w1", "Gamma", "active_client")).await;
    insert_company(&conn, company_model("c_prospect", "w1", "Delta", "prospect")).await;
    insert_company(&conn, company_model("c_other_ws", "w2", "Epsilon", "active_client")).await;
    insert_company(&conn, company_model("c_no_profile", "w1", "Zeta", "active_client")).await;

    let due_on_5 = ProfileUpdate {
        billing_day: Some(5),
        ..ProfileUpdate::default()
    };
    for id in ["c_due", "c_due2", "c_prospect", "c_other_ws"] {
        store.update_profile(id, &due_on_5).await.unwrap();
    }
    store
        .update_profile(
            "c_other_day",
            &ProfileUpdate {
                billing_day: Some(6),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();

    let directory = SeaOrmCrmDirectory::new(conn);
    let due: Vec<String> = directory
        .due_companies("w1", 5)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    // Ordered by name
    assert_eq!(due, vec!["c_due2", "c_due"]);
    assert!(directory.due_companies("w1", 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_company_lookup_maps_tax_id() {
    let db = TestDb::new().await.unwrap();
    let conn = db.connection();
    insert_company(&conn, company_model("c1", "w1", "Acme", "active_client")).await;

    let directory = SeaOrmCrmDirectory::new(conn);
    let company = directory.company("c1").await.unwrap().unwrap();
    assert_eq!(company.tax_id.as_deref(), Some("131-00000-1"));
    assert_eq!(company.display_legal_name(), "Acme");
    assert!(directory.company("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_recipients_are_flagged_contacts_with_email_oldest_first() {
    let db = TestDb::new().await.unwrap();
    let conn = db.connection();
    insert_contact(&conn, "c1", Some("late@acme.test"), true, march(3, 0)).await;
    insert_contact(&conn, "c1", Some(" early@acme.test "), true, march(1, 0)).await;
    insert_contact(&conn, "c1", Some("sales@acme.test"), false, march(1, 0)).await;
    insert_contact(&conn, "c1", None, true, march(1, 0)).await;
    insert_contact(&conn, "c1", Some(""), true, march(1, 0)).await;
    insert_contact(&conn, "c2", Some("other@globex.test"), true, march(1, 0)).await;

    let directory = SeaOrmCrmDirectory::new(conn);
    let emails: Vec<String> = directory
        .invoice_recipients("c1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.email)
        .collect();

    assert_eq!(emails, vec!["early@acme.test", "late@acme.test"]);
}

#[tokio::test]
async fn test_entity_counts_only_count_active_rows() {
    let db = TestDb::new().await.unwrap();
    let conn = db.connection();

    for (company_id, status) in [("c1", "active"), ("c1", "active"), ("c1", "archived"), ("c2", "active")] {
        let model = project::Model {
            id: fixtures::fake::id("prj"),
            company_id: company_id.to_string(),
            status: status.to_string(),
        };
        project::Entity::insert(model.into_active_model())
            .exec_without_returning(&conn)
            .await
            .unwrap();
    }
    for is_active in [true, true, true, false] {
        let model = company_user::Model {
            id: fixtures::fake::id("cu"),
            company_id: "c1".to_string(),
            is_active,
        };
        company_user::Entity::insert(model.into_active_model())
            .exec_without_returning(&conn)
            .await
            .unwrap();
    }

    let directory = SeaOrmCrmDirectory::new(conn);
    let counts = directory.entity_counts("c1").await.unwrap();
    assert_eq!((counts.active_projects, counts.active_users), (2, 3));

    let empty = directory.entity_counts("c9").await.unwrap();
    assert_eq!((empty.active_projects, empty.active_users), (0, 0));
}
