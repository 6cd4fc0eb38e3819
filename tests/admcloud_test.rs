//! AdmCloud client against a mock HTTP server.

use chrono::NaiveDate;
use crm_billing::billing::types::{AdmCloudCredentials, AdmCloudSettings};
use crm_billing::billing::{
    AccountingClientFactory, AdmCloudClientConfig, AdmCloudFactory, BillingError, Company,
    ResolvedLine, accounting::create_quote_for,
};
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("api-user:hunter2")
const BASIC_AUTH: &str = "Basic YXBpLXVzZXI6aHVudGVyMg==";

fn credentials() -> AdmCloudCredentials {
    AdmCloudCredentials {
        app_id: "app-1".to_string(),
        company: "co-1".to_string(),
        username: "api-user".to_string(),
        password: SecretString::from("hunter2".to_string()),
    }
}

fn factory(server: &MockServer) -> AdmCloudFactory {
    AdmCloudFactory::new(
        AdmCloudClientConfig::new()
            .base_url(format!("{}/api", server.uri()))
            .base_delay_ms(1)
            .max_retries(2),
    )
    .unwrap()
}

fn customer_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "ID": "REL-42",
            "Name": "Acme Dominicana SRL",
            "Addresses": [
                { "ID": "ADDR-1", "Address1": "Calle 1", "City": "Santiago", "IsDefaultBilling": false },
                { "ID": "ADDR-2", "Address1": "Av. Principal 10", "City": "Santo Domingo", "Country": "DO", "IsDefaultBilling": true }
            ],
            "Contacts": [
                { "ID": "CT-1", "Name": "Ana", "ReceiveQuotes": false },
                { "ID": "CT-2", "Name": "Luis", "ReceiveQuotes": true }
            ]
        }
    })
}

#[tokio::test]
async fn test_get_customer_sends_credentials_and_unwraps_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-42"))
        .and(query_param("appid", "app-1"))
        .and(query_param("company", "co-1"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(customer_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let customer = client.get_customer("REL-42").await.unwrap();

    assert_eq!(customer.id, "REL-42");
    assert_eq!(customer.billing_address().unwrap().id, "ADDR-2");
    assert_eq!(customer.quote_contact().unwrap().id, "CT-2");
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-404"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "Customer not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let err = client.get_customer("REL-404").await.unwrap_err();

    assert_eq!(
        err,
        BillingError::AccountingApi {
            operation: "get_customer".to_string(),
            message: "Customer not found".to_string(),
            http_status: Some(200),
        }
    );
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-42"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(customer_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let customer = client.get_customer("REL-42").await.unwrap();
    assert_eq!(customer.id, "REL-42");
}

fn empty_quote() -> crm_billing::billing::accounting::QuoteRequest {
    crm_billing::billing::accounting::build_quote(
        &AdmCloudSettings::disabled(),
        "REL-42",
        &Default::default(),
        &[],
        None,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        "USD",
    )
}

#[tokio::test]
async fn test_reads_give_up_after_retry_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-42"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let err = client.get_customer("REL-42").await.unwrap_err();

    assert!(err.to_string().contains("[HTTP 500]"), "{err}");
}

#[tokio::test]
async fn test_quote_is_not_posted_again_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let err = client.create_quote(&empty_quote()).await.unwrap_err();

    assert!(err.to_string().contains("[HTTP 500]"), "{err}");
}

#[tokio::test]
async fn test_slow_quote_is_posted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "data": { "ID": "q-1", "DocID": "COT-1" } }))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let factory = AdmCloudFactory::new(
        AdmCloudClientConfig::new()
            .base_url(format!("{}/api", server.uri()))
            .base_delay_ms(1)
            .max_retries(2)
            .timeout_seconds(1),
    )
    .unwrap();
    let client = factory.connect(&credentials()).unwrap();
    let err = client.create_quote(&empty_quote()).await.unwrap_err();

    assert!(err.to_string().contains("[HTTP 408]"), "{err}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rate_limited_quote_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "data": { "ID": "q-2", "DocID": "COT-2" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let created = client.create_quote(&empty_quote()).await.unwrap();

    assert_eq!(created.id, "q-2");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({ "success": false, "message": "Invalid item ADM-9" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = factory(&server).connect(&credentials()).unwrap();
    let err = client.create_quote(&empty_quote()).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "AdmCloud error during 'create_quote': Invalid item ADM-9 [HTTP 422]"
    );
}

#[tokio::test]
async fn test_quote_for_linked_company() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Customers/REL-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(customer_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/Quotes"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_partial_json(json!({
            "RelationshipID": "REL-42",
            "DocDate": "2024-03-01",
            "CurrencyID": "USD",
            "PaymentTermID": "NET30",
            "ContactID": "CT-2",
            "BillToAddressID": "ADDR-2",
            "BillToCity": "Santo Domingo",
            "Notes": "Subscription March 2024",
            "Items": [
                { "ItemID": "ADM-USERS", "Quantity": 6.0, "Price": 15.0, "RowOrder": 1 },
                { "ItemID": "SUPPORT", "Quantity": 1.0, "Price": 250.0, "RowOrder": 2 }
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "data": { "ID": "q-77", "DocID": "COT-000077" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = AdmCloudSettings {
        enabled: true,
        credentials: Some(credentials()),
        default_payment_term_id: Some("NET30".to_string()),
        default_sales_stage_id: None,
    };
    let company = Company {
        id: "cmp_acme01".to_string(),
        workspace_id: "w1".to_string(),
        name: "Acme".to_string(),
        legal_name: None,
        tax_id: None,
        fiscal_address: None,
        status: "active_client".to_string(),
        admcloud_relationship_id: Some("REL-42".to_string()),
    };
    let lines = vec![
        ResolvedLine {
            item_id: Uuid::new_v4(),
            external_item_id: Some("ADM-USERS".to_string()),
            code: "CRM-USERS".to_string(),
            description: "Users".to_string(),
            count_type: "active_users".to_string(),
            quantity: dec!(6),
            unit_price: dec!(15),
            line_total: dec!(90),
        },
        ResolvedLine {
            item_id: Uuid::new_v4(),
            external_item_id: None,
            code: "SUPPORT".to_string(),
            description: "Support".to_string(),
            count_type: "manual".to_string(),
            quantity: dec!(1),
            unit_price: dec!(250),
            line_total: dec!(250),
        },
    ];

    let outcome = create_quote_for(
        &factory(&server),
        &settings,
        &company,
        &lines,
        Some("Subscription March 2024"),
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        "USD",
    )
    .await;

    assert_eq!(outcome.doc_id.as_deref(), Some("q-77"));
    assert_eq!(outcome.doc_number.as_deref(), Some("COT-000077"));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_unreachable_server_falls_back_with_error() {
    // Nothing listens on the mock server once it is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let factory = AdmCloudFactory::new(
        AdmCloudClientConfig::new()
            .base_url(uri)
            .base_delay_ms(1)
            .max_retries(0),
    )
    .unwrap();
    let settings = AdmCloudSettings {
        enabled: true,
        credentials: Some(credentials()),
        default_payment_term_id: None,
        default_sales_stage_id: None,
    };
    let company = Company {
        id: "cmp_acme01".to_string(),
        workspace_id: "w1".to_string(),
        name: "Acme".to_string(),
        legal_name: None,
        tax_id: None,
        fiscal_address: None,
        status: "active_client".to_string(),
        admcloud_relationship_id: Some("REL-42".to_string()),
    };

    let outcome = create_quote_for(
        &factory,
        &settings,
        &company,
        &[],
        None,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        "USD",
    )
    .await;

    assert!(!outcome.created());
    assert!(
        outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("AdmCloud error during 'get_customer'")
    );
}
