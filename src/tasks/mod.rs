//! Background scheduled tasks for the application.
//!
//! Currently a single job: the reservation sweeper, which rejects pending
//! participations whose hold window has elapsed and cancels their payment
//! intents. Call `spawn_all` once during startup.

use crate::services::PaymentService;

/// Spawn all background tasks.
///
/// `sweep_interval_secs == 0` disables the sweeper; expired holds are still
/// ignored on read by the allocation resolver.
pub fn spawn_all(payment_service: PaymentService, sweep_interval_secs: u64) {
    if sweep_interval_secs == 0 {
        log::info!("Reservation sweeper disabled");
        return;
    }

    // 过期预留清理
    {
        let svc = payment_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.release_expired(chrono::Utc::now()).await {
                    Ok(n) if n > 0 => log::info!("Expired reservations released: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to release expired reservations: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(sweep_interval_secs)).await;
            }
        });
    }
}
