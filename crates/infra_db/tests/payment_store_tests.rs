//! PostgreSQL Payment Store Tests
//!
//! Run against a throwaway PostgreSQL container:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use chrono::Utc;
use core_kernel::PortError;
use domain_payments::{
    GatewayType, PaymentGateway, PaymentStore, QuoteStatus, TransactionFilter, TransactionStatus,
    TransitionResult,
};
use serde_json::json;
use test_utils::{db_test, CatalogFixtures, TestQuoteBuilder, TestTransactionBuilder};

db_test!(test_insert_and_find_transaction, |db| {
    let store = db.store();
    CatalogFixtures::seed(&store).await;
    let quote = TestQuoteBuilder::new().build();
    store.insert_quote(&quote).await.unwrap();

    let method = store.find_payment_method_by_name(domain_payments::catalog::CARD).await.unwrap().unwrap();
    let gateway = store.list_gateways(Some(GatewayType::MercadoPago), true).await.unwrap().remove(0);
    let tx = TestTransactionBuilder::new()
        .for_quote(&quote)
        .with_method(&method)
        .with_gateway(Some(&gateway))
        .build();
    store.insert_transaction(&tx).await.unwrap();

    let found = store.find_transaction(&tx.transaction_id).await.unwrap().unwrap();
    assert_eq!(found.transaction_id, tx.transaction_id);
    assert_eq!(found.status, TransactionStatus::Pending);
    assert_eq!(found.amount, quote.amount);

    let duplicate = store.insert_transaction(&tx).await.unwrap_err();
    assert!(matches!(duplicate, PortError::Conflict { .. }));
});

db_test!(test_commit_transition_is_conditional, |db| {
    let store = db.store();
    CatalogFixtures::seed(&store).await;
    let quote = TestQuoteBuilder::new().build();
    store.insert_quote(&quote).await.unwrap();

    let method = store.find_payment_method_by_name(domain_payments::catalog::CARD).await.unwrap().unwrap();
    let gateway = store.list_gateways(Some(GatewayType::MercadoPago), true).await.unwrap().remove(0);
    let mut tx = TestTransactionBuilder::new()
        .for_quote(&quote)
        .with_method(&method)
        .with_gateway(Some(&gateway))
        .build();
    store.insert_transaction(&tx).await.unwrap();

    let now = Utc::now();
    tx.assign_external_id("mp-1");
    tx.approve(now).unwrap();
    let mut paid = quote.clone();
    paid.mark_paid(&tx.transaction_id, Some("mp-1"), Some("mercadopago"), now).unwrap();

    let first = store.commit_transition(&tx, Some(&paid)).await.unwrap();
    assert_eq!(first, TransitionResult::Applied { quote_marked_paid: true });

    let replay = store.commit_transition(&tx, Some(&paid)).await.unwrap();
    assert_eq!(replay, TransitionResult::AlreadyFinal(TransactionStatus::Approved));

    let stored_quote = store.get_quote(quote.id).await.unwrap();
    assert_eq!(stored_quote.status, QuoteStatus::Paid);
    assert_eq!(stored_quote.payment_data["external_id"], json!("mp-1"));

    let stored_tx = store.find_transaction(&tx.transaction_id).await.unwrap().unwrap();
    assert_eq!(stored_tx.external_id.as_deref(), Some("mp-1"));
    assert!(stored_tx.confirmed_at.is_some());
});

db_test!(test_update_pending_skips_terminal_rows, |db| {
    let store = db.store();
    CatalogFixtures::seed(&store).await;
    let quote = TestQuoteBuilder::new().build();
    store.insert_quote(&quote).await.unwrap();

    let method = store.find_payment_method_by_name(domain_payments::catalog::CASH).await.unwrap().unwrap();
    let mut tx = TestTransactionBuilder::new()
        .for_quote(&quote)
        .with_method(&method)
        .with_gateway(None)
        .build();
    store.insert_transaction(&tx).await.unwrap();

    tx.set_detail("payment_reference", "DEP-1");
    assert!(store.update_pending(&tx).await.unwrap());

    tx.reject("duplicate deposit", Utc::now()).unwrap();
    store.commit_transition(&tx, None).await.unwrap();

    tx.set_detail("late", true);
    assert!(!store.update_pending(&tx).await.unwrap());

    let stored = store.find_transaction(&tx.transaction_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Rejected);
    assert!(!stored.payment_details.contains_key("late"));
});

db_test!(test_one_active_gateway_per_type, |db| {
    let store = db.store();
    store.insert_gateway(&CatalogFixtures::bank_gateway()).await.unwrap();

    let second = PaymentGateway::new("Otro Banco", GatewayType::BankTransfer);
    let err = store.insert_gateway(&second).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict { .. }));

    store.insert_gateway(&second.inactive()).await.unwrap();
    assert_eq!(store.list_gateways(Some(GatewayType::BankTransfer), false).await.unwrap().len(), 2);
    assert_eq!(store.list_gateways(Some(GatewayType::BankTransfer), true).await.unwrap().len(), 1);
});

db_test!(test_list_transactions_in_creation_order, |db| {
    let store = db.store();
    CatalogFixtures::seed(&store).await;
    let quote = TestQuoteBuilder::new().build();
    let other = TestQuoteBuilder::new().build();
    store.insert_quote(&quote).await.unwrap();
    store.insert_quote(&other).await.unwrap();

    let method = store.find_payment_method_by_name(domain_payments::catalog::CASH).await.unwrap().unwrap();
    let mut ids = Vec::new();
    for q in [&quote, &other, &quote] {
        let tx = TestTransactionBuilder::new()
            .for_quote(q)
            .with_method(&method)
            .with_gateway(None)
            .build();
        store.insert_transaction(&tx).await.unwrap();
        if q.id == quote.id {
            ids.push(tx.transaction_id);
        }
    }

    let listed: Vec<_> = store
        .list_transactions(&TransactionFilter::for_quote(quote.id))
        .await
        .unwrap()
        .into_iter()
        .map(|tx| tx.transaction_id)
        .collect();
    assert_eq!(listed, ids);
});

db_test!(test_update_method_and_count_pending, |db| {
    let store = db.store();
    CatalogFixtures::seed(&store).await;
    let quote = TestQuoteBuilder::new().build();
    store.insert_quote(&quote).await.unwrap();

    let mut cash = store.find_payment_method_by_name(domain_payments::catalog::CASH).await.unwrap().unwrap();
    assert_eq!(store.count_pending_for_method(cash.id).await.unwrap(), 0);

    let mut tx = TestTransactionBuilder::new()
        .for_quote(&quote)
        .with_method(&cash)
        .with_gateway(None)
        .build();
    store.insert_transaction(&tx).await.unwrap();
    assert_eq!(store.count_pending_for_method(cash.id).await.unwrap(), 1);

    tx.reject("no deposit found", Utc::now()).unwrap();
    store.commit_transition(&tx, None).await.unwrap();
    assert_eq!(store.count_pending_for_method(cash.id).await.unwrap(), 0);

    cash.description = "Pago en conserjería".to_string();
    cash.is_active = false;
    store.update_payment_method(&cash).await.unwrap();
    let stored = store.get_payment_method(cash.id).await.unwrap();
    assert_eq!(stored.description, "Pago en conserjería");
    assert!(!stored.is_active);
    assert!(store.list_payment_methods(true).await.unwrap().iter().all(|m| m.id != cash.id));

    cash.name = domain_payments::catalog::CARD.to_string();
    let err = store.update_payment_method(&cash).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict { .. }));

    let unknown = domain_payments::PaymentMethod::new("Cheque", "Cheque al día", false, true);
    let err = store.update_payment_method(&unknown).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound { .. }));
});
