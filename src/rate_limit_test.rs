use super::*;

#[test]
fn allows_up_to_limit_then_limits() {
    let rl = RateLimiter::new(5, Duration::from_secs(900));
    let now = Instant::now();

    for i in 0..5 {
        assert!(rl.check_and_record_at("login:1.2.3.4", now).is_allowed(), "attempt {i} should succeed");
    }
    assert_eq!(
        rl.check_and_record_at("login:1.2.3.4", now),
        RateDecision::Limited { retry_after_secs: 900 }
    );
}

#[test]
fn remaining_counts_down() {
    let rl = RateLimiter::new(3, Duration::from_secs(60));
    let now = Instant::now();
    assert_eq!(rl.check_and_record_at("k", now), RateDecision::Allowed { remaining: 2 });
    assert_eq!(rl.check_and_record_at("k", now), RateDecision::Allowed { remaining: 1 });
    assert_eq!(rl.check_and_record_at("k", now), RateDecision::Allowed { remaining: 0 });
}

#[test]
fn limited_attempts_are_not_recorded() {
    let rl = RateLimiter::new(1, Duration::from_secs(10));
    let start = Instant::now();
    assert!(rl.check_and_record_at("k", start).is_allowed());
    for s in 1..5 {
        assert!(!rl.check_and_record_at("k", start + Duration::from_secs(s)).is_allowed());
    }
    // Only the first attempt occupies the window, so it frees up at t=10.
    assert!(rl.check_and_record_at("k", start + Duration::from_secs(10)).is_allowed());
}

#[test]
fn retry_after_shrinks_as_window_ages() {
    let rl = RateLimiter::new(1, Duration::from_secs(60));
    let start = Instant::now();
    rl.check_and_record_at("k", start);
    assert_eq!(
        rl.check_and_record_at("k", start + Duration::from_millis(45_500)),
        RateDecision::Limited { retry_after_secs: 15 }
    );
}

#[test]
fn window_expiry_allows_new_requests() {
    let rl = RateLimiter::new(2, Duration::from_secs(60));
    let start = Instant::now();
    rl.check_and_record_at("k", start);
    rl.check_and_record_at("k", start);
    assert!(!rl.check_and_record_at("k", start + Duration::from_secs(30)).is_allowed());
    assert!(rl.check_and_record_at("k", start + Duration::from_secs(61)).is_allowed());
}

#[test]
fn separate_keys_do_not_interfere() {
    let rl = RateLimiter::new(1, Duration::from_secs(60));
    let now = Instant::now();
    assert!(rl.check_and_record_at("a", now).is_allowed());
    assert!(rl.check_and_record_at("b", now).is_allowed());
    assert!(!rl.check_and_record_at("a", now).is_allowed());
}

#[test]
fn sweep_drops_idle_keys() {
    let rl = RateLimiter::new(1, Duration::from_secs(1));
    let start = Instant::now();
    for i in 0..=SWEEP_THRESHOLD {
        rl.check_and_record_at(&format!("k{i}"), start);
    }
    assert_eq!(rl.tracked_keys(), SWEEP_THRESHOLD + 1);
    rl.check_and_record_at("fresh", start + Duration::from_secs(5));
    assert_eq!(rl.tracked_keys(), 1);
}

#[test]
fn ceil_secs_rounds_up_and_floors_at_one() {
    assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
    assert_eq!(ceil_secs(Duration::ZERO), 1);
    assert_eq!(ceil_secs(Duration::from_millis(14_001)), 15);
    assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
}
