use mws_client::offers::{Offer, compare_offers, sort_offers};
use mws_client::poll::{CancelGate, PollDelay};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn test_delay_doubles_and_resets() {
    let mut delay = PollDelay::new(Duration::from_secs(30), Duration::from_secs(200));
    assert_eq!(delay.current(), Duration::from_secs(30));
    assert_eq!(delay.escalate(), Duration::from_secs(60));
    assert_eq!(delay.escalate(), Duration::from_secs(120));
    assert_eq!(delay.escalate(), Duration::from_secs(200));
    assert_eq!(delay.escalate(), Duration::from_secs(200));
    delay.reset();
    assert_eq!(delay.current(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_wait_sleeps_for_the_current_delay() {
    let mut delay = PollDelay::new(Duration::from_secs(45), Duration::from_secs(3600));
    let started = Instant::now();
    delay.wait().await;
    delay.escalate();
    delay.wait().await;
    assert_eq!(started.elapsed(), Duration::from_secs(45 + 90));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_gate_spacing() {
    let window = Duration::from_secs(45);
    let mut gate = CancelGate::new();
    let started = Instant::now();

    gate.wait(window).await;
    gate.mark();
    assert_eq!(started.elapsed(), Duration::ZERO);

    gate.wait(window).await;
    gate.mark();
    assert_eq!(started.elapsed(), Duration::from_secs(45));

    tokio::time::sleep(Duration::from_secs(60)).await;
    gate.wait(window).await;
    gate.mark();
    assert_eq!(started.elapsed(), Duration::from_secs(105));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_gate_counts_from_call_end() {
    let window = Duration::from_secs(45);
    let mut gate = CancelGate::new();
    let started = Instant::now();

    gate.wait(window).await;
    // A slow cancel call
    tokio::time::sleep(Duration::from_secs(20)).await;
    gate.mark();

    gate.wait(window).await;
    assert_eq!(started.elapsed(), Duration::from_secs(65));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_gate_ignores_unmarked_calls() {
    let window = Duration::from_secs(45);
    let mut gate = CancelGate::new();
    let started = Instant::now();

    // The first call failed, nothing was marked
    gate.wait(window).await;
    gate.wait(window).await;
    assert_eq!(started.elapsed(), Duration::ZERO);
}

fn offer(seller: &str, price: &str, shipping: &str, winner: bool) -> Offer {
    Offer {
        seller: seller.to_string(),
        price: Decimal::from_str(price).unwrap(),
        shipping: Decimal::from_str(shipping).unwrap(),
        winner,
    }
}

#[test]
fn test_winner_first_then_landed_price() {
    let mut offers = vec![
        offer("c", "10.00", "5.00", false),
        offer("a", "12.00", "0.00", false),
        offer("b", "20.00", "4.99", true),
        offer("d", "9.00", "1.00", false),
    ];
    sort_offers(&mut offers);
    let sellers: Vec<&str> = offers.iter().map(|offer| offer.seller.as_str()).collect();
    assert_eq!(sellers, vec!["b", "d", "a", "c"]);

    assert_eq!(offers[0].landed_price(), Decimal::from_str("24.99").unwrap());
    assert_eq!(
        compare_offers(&offer("x", "1", "1", false), &offer("y", "2", "0", false)),
        Ordering::Equal
    );
}
