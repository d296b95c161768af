use ntk::core::config::TasksConfig;
use ntk::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

fn count_primes(limit: u64) -> usize {
    (2..limit)
        .filter(|n| (2..).take_while(|d| d * d <= *n).all(|d| n % d != 0))
        .count()
}

/// Re-arms itself every 100ms until the display goes away.
fn heartbeat(display: &Display, id: CallbackId, ticks: Rc<Cell<u32>>) -> Result<()> {
    let again = display.clone();
    display.request_timer(100, id, move || {
        ticks.set(ticks.get() + 1);
        log::debug!("heartbeat {}", ticks.get());
        if let Err(err) = heartbeat(&again, id, ticks.clone()) {
            log::warn!("heartbeat stopped: {}", err);
        }
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = DisplayConfig {
        app_name: "cross-thread".to_string(),
        tasks: Some(TasksConfig::default()),
        ..DisplayConfig::headless()
    };
    let display = Display::with_config(config)?;
    let proxy = display.proxy();

    let ticks = Rc::new(Cell::new(0u32));
    heartbeat(&display, CallbackId::next(), ticks.clone())?;

    proxy.spawn_then(async { count_primes(20_000) }, |_, primes| {
        log::info!("background task found {} primes", primes);
    });

    let worker = thread::spawn(move || -> anyhow::Result<()> {
        for chunk in 1..=5u64 {
            let primes = count_primes(chunk * 10_000);
            proxy.async_exec(move || log::info!("chunk {}: {} primes", chunk, primes))?;
            thread::sleep(Duration::from_millis(50));
        }

        let total = proxy.sync_exec(|| {
            Display::current().map_or(0, |display| display.pending_events())
        })?;
        log::info!("UI thread had {} pending events", total);

        proxy.async_exec(|| {
            if let Some(display) = Display::current() {
                if let Err(err) = display.close() {
                    log::error!("close failed: {}", err);
                }
            }
        })?;
        Ok(())
    });

    display.run()?;
    log::info!("event loop finished after {} heartbeats", ticks.get());

    match worker.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("worker thread panicked"),
    }
}
