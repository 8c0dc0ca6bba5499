use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use fleetbook::engine::Engine;
use fleetbook::index::IntervalIndex;
use fleetbook::model::{Booking, Interval};

const HOUR: i64 = 3_600_000; // 1 hour in ms
/// 2026-01-01T00:00:00Z
const EPOCH: i64 = 1_767_225_600_000;
const PASSWORD: &str = "bench-password";

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// Deterministic shuffle so runs are comparable.
fn shuffled(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut state = seed;
    for i in (1..n).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        order.swap(i, j);
    }
    order
}

fn slot(i: usize) -> Interval {
    let start = EPOCH + i as i64 * 2 * HOUR;
    Interval::new(start, start + HOUR).unwrap()
}

fn bench_index(n: usize) {
    let mut index = IntervalIndex::new();
    let order = shuffled(n, 42);

    let start = Instant::now();
    for &i in &order {
        index
            .insert(Booking::new(Ulid::new(), "bench@example.com", slot(i), 100))
            .unwrap();
    }
    let elapsed = start.elapsed();
    println!(
        "  {n} inserts in {:.3}s = {:.0} ops/sec, height {}",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64(),
        index.height()
    );

    let mut latencies = Vec::with_capacity(n);
    let mut hits = 0;
    for &i in &order {
        // Half the queries land in the gap after a booking.
        let query = if i % 2 == 0 {
            slot(i)
        } else {
            let s = slot(i).end() + 1;
            Interval::new(s, s + HOUR / 2).unwrap()
        };
        let t = Instant::now();
        if index.is_occupied(&query) {
            hits += 1;
        }
        latencies.push(t.elapsed());
    }
    println!("  occupied queries: {hits}/{n}");
    print_latency("is_occupied", &mut latencies);

    let start = Instant::now();
    for &i in order.iter().step_by(2) {
        index.remove_interval(&slot(i)).unwrap();
    }
    println!(
        "  removed {} in {:.3}s, {} left",
        n.div_ceil(2),
        start.elapsed().as_secs_f64(),
        index.len()
    );
}

async fn setup(path: PathBuf, vehicles: usize, users: usize) -> (Arc<Engine>, Vec<String>, Vec<String>) {
    let engine = Arc::new(Engine::new(path).unwrap());
    let mut plates = Vec::new();
    for v in 0..vehicles {
        let plate = format!("BENCH{v:03}");
        engine.add_vehicle(&plate, "Bench Car", 1000).await.unwrap();
        plates.push(plate);
    }
    let mut emails = Vec::new();
    for u in 0..users {
        let email = format!("user{u}@example.com");
        engine.register_user(&email, "Bench", PASSWORD).await.unwrap();
        emails.push(email);
    }
    println!("  created {vehicles} vehicles and {users} users");
    (engine, plates, emails)
}

async fn bench_sequential(engine: &Engine, plate: &str, client: &str, n: usize) {
    let start = Instant::now();
    for i in 0..n {
        engine.book(Ulid::new(), plate, client, slot(i)).await.unwrap();
    }
    let elapsed = start.elapsed();
    println!(
        "  {n} bookings in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
}

/// Every task races for the same slots on the same vehicles; exactly one
/// booking per slot may win.
async fn bench_contention(engine: Arc<Engine>, plates: &[String], clients: &[String], slots: usize) {
    let start = Instant::now();
    let mut handles = Vec::new();
    for client in clients {
        let engine = engine.clone();
        let plates = plates.to_vec();
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut won = 0usize;
            for i in 0..slots {
                let plate = &plates[i % plates.len()];
                let t = Instant::now();
                if engine.book(Ulid::new(), plate, &client, slot(10_000 + i)).await.is_ok() {
                    won += 1;
                }
                latencies.push(t.elapsed());
            }
            (won, latencies)
        }));
    }

    let mut total_won = 0;
    let mut latencies = Vec::new();
    for h in handles {
        let (won, lat) = h.await.unwrap();
        total_won += won;
        latencies.extend(lat);
    }
    let elapsed = start.elapsed();
    println!(
        "  {} attempts by {} clients in {:.2}s, {total_won} won (expected {slots})",
        latencies.len(),
        clients.len(),
        elapsed.as_secs_f64()
    );
    assert_eq!(total_won, slots, "double booking detected");
    print_latency("book (contended)", &mut latencies);
}

async fn bench_reads_under_load(engine: Arc<Engine>, plates: &[String], client: &str, n: usize) {
    let writer = {
        let engine = engine.clone();
        let plate = plates[0].clone();
        let client = client.to_string();
        tokio::spawn(async move {
            for i in 0..n {
                let _ = engine.book(Ulid::new(), &plate, &client, slot(20_000 + i)).await;
            }
        })
    };

    let mut latencies = Vec::with_capacity(n);
    for i in 0..n {
        let plate = &plates[i % plates.len()];
        let t = Instant::now();
        engine.is_available(plate, slot(20_000 + i)).await.unwrap();
        latencies.push(t.elapsed());
    }
    writer.await.unwrap();
    print_latency("is_available (under write load)", &mut latencies);

    let t = Instant::now();
    let free = engine.available_vehicles(slot(30_000)).await.unwrap();
    println!(
        "  available_vehicles: {} free in {:.3}ms",
        free.len(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join(format!("fleetbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();

    println!("=== fleetbook stress benchmark ===");

    println!("\n[phase 1] interval index");
    bench_index(100_000);

    println!("\n[setup]");
    let (engine, plates, clients) = setup(dir.join("bench.wal"), 10, 8).await;

    println!("\n[phase 2] sequential booking throughput");
    bench_sequential(&engine, &plates[0], &clients[0], 2_000).await;

    println!("\n[phase 3] contended booking");
    bench_contention(engine.clone(), &plates, &clients, 500).await;

    println!("\n[phase 4] read latency under write load");
    bench_reads_under_load(engine.clone(), &plates, &clients[0], 2_000).await;

    println!("\n[phase 5] compaction");
    let t = Instant::now();
    engine.compact_wal().await.unwrap();
    println!("  compacted in {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);

    let _ = std::fs::remove_dir_all(&dir);
}
