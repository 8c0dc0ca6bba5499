use std::path::PathBuf;

use ulid::Ulid;

use fleetbook::console::{self, Session};
use fleetbook::engine::Engine;

const H: i64 = 3_600_000;
/// 2026-01-01T00:00:00Z
const DAY0: i64 = 1_767_225_600_000;

fn at(hour: i64) -> i64 {
    DAY0 + hour * H
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fleetbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

async fn run_script(engine: &Engine, script: &str) -> String {
    let mut output = Vec::new();
    console::run(engine, script.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output).unwrap()
}

#[tokio::test]
async fn scripted_booking_session() {
    let engine = Engine::new(test_wal_path("session.wal")).unwrap();
    let script = format!(
        "register alice@example.com hunter2hunter2 Alice Liddell\n\
         add-vehicle ab123 1500 Toyota Corolla\n\
         book AB123 {nine} {ten}\n\
         login alice@example.com hunter2hunter2\n\
         whoami\n\
         add-vehicle ab123 1500 Toyota Corolla\n\
         book ab123 {nine} {ten}\n\
         book AB123 {ten} {eleven}\n\
         book AB123 {eleven_01} {noon}\n\
         check AB123 {ten} {noon}\n\
         available {eight} {eight_30}\n\
         bookings ab123\n\
         frobnicate\n\
         \n\
         quit\n\
         vehicles\n",
        eight = at(8),
        eight_30 = at(8) + H / 2,
        nine = at(9),
        ten = at(10),
        eleven = at(11),
        eleven_01 = at(11) + 60_000,
        noon = at(12),
    );
    let out = run_script(&engine, &script).await;
    let lines: Vec<&str> = out.lines().collect();

    assert!(lines[0].starts_with("fleetbook ready"));
    assert_eq!(lines[1], "registered alice@example.com (Alice Liddell)");
    // Anonymous sessions can neither change the fleet nor book.
    assert_eq!(lines[2], "error: log in first");
    assert_eq!(lines[3], "error: log in first");
    assert_eq!(lines[4], "welcome, Alice Liddell");
    assert_eq!(lines[5], "alice@example.com (Alice Liddell)");
    assert_eq!(lines[6], "added AB123 (Toyota Corolla) at 15.00/h");
    assert!(lines[7].starts_with("booked: "), "{}", lines[7]);
    assert!(lines[7].contains("15.00"));
    // [10:00, 11:00] touches the stored [09:00, 10:00].
    assert!(lines[8].starts_with("error: vehicle AB123 is already booked"), "{}", lines[8]);
    // 11:01 to 12:00 rounds up to one billable hour.
    assert!(lines[9].starts_with("booked: "), "{}", lines[9]);
    assert!(out.contains("occupied during"));
    assert!(
        lines.iter().any(|l| l.starts_with("AB123 ") && l.contains("Toyota Corolla")),
        "{out}"
    );
    assert!(out.contains("error: unknown command 'frobnicate'"));
    assert_eq!(lines.last().copied(), Some("bye"));
    assert!(!out.contains("no vehicles"));

    let bookings = engine.vehicle_bookings("AB123").await.unwrap();
    assert_eq!(bookings.len(), 2);
    assert_eq!(bookings[0].start, at(9));
    assert_eq!(bookings[1].start, at(11) + 60_000);
}

#[tokio::test]
async fn cancel_respects_ownership() {
    let engine = Engine::new(test_wal_path("cancel.wal")).unwrap();
    let mut alice = Session::default();
    let mut bob = Session::default();

    for line in [
        "register alice@example.com hunter2hunter2 Alice",
        "register bob@example.com hunter2hunter2 Bob",
        "login alice@example.com hunter2hunter2",
        "add-vehicle CD456 900 VW Golf",
    ] {
        let reply = console::run_line(&engine, &mut alice, line).await.unwrap();
        assert!(!reply.starts_with("error"), "{line}: {reply}");
    }
    console::run_line(&engine, &mut bob, "login bob@example.com hunter2hunter2")
        .await
        .unwrap();

    let booked = console::run_line(&engine, &mut alice, &format!("book CD456 {} {}", at(9), at(12)))
        .await
        .unwrap();
    assert!(booked.starts_with("booked: "), "{booked}");
    assert!(booked.contains("27.00"));
    let id = engine.user_bookings("alice@example.com").await.unwrap()[0].id;

    let denied = console::run_line(&engine, &mut bob, &format!("cancel {id}")).await.unwrap();
    assert_eq!(denied, format!("error: booking {id} belongs to another user"));
    assert_eq!(
        console::run_line(&engine, &mut bob, "my-bookings").await.unwrap(),
        "no bookings"
    );

    let cancelled = console::run_line(&engine, &mut alice, &format!("cancel {id}")).await.unwrap();
    assert!(cancelled.starts_with("cancelled: "), "{cancelled}");
    let again = console::run_line(&engine, &mut alice, &format!("cancel {id}")).await.unwrap();
    assert_eq!(again, format!("error: not found: {id}"));

    assert_eq!(
        console::run_line(&engine, &mut alice, "logout").await.unwrap(),
        "goodbye, Alice"
    );
    assert_eq!(
        console::run_line(&engine, &mut alice, "my-bookings").await.unwrap(),
        "error: log in first"
    );
    assert!(console::run_line(&engine, &mut alice, "exit").await.is_none());
}

#[tokio::test]
async fn session_survives_restart() {
    let path = test_wal_path("restart.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        let script = format!(
            "register alice@example.com hunter2hunter2 Alice\n\
             login alice@example.com hunter2hunter2\n\
             add-vehicle AB123 1500 Corolla\n\
             book AB123 {} {}\n\
             compact\n\
             book AB123 {} {}\n",
            at(9),
            at(10),
            at(14),
            at(15),
        );
        let out = run_script(&engine, &script).await;
        assert!(out.contains("log compacted"), "{out}");
    }

    let engine = Engine::new(path).unwrap();
    let mut session = Session::default();
    let reply = console::run_line(&engine, &mut session, "login alice@example.com hunter2hunter2")
        .await
        .unwrap();
    assert_eq!(reply, "welcome, Alice");
    let mine = console::run_line(&engine, &mut session, "my-bookings").await.unwrap();
    assert_eq!(mine.lines().count(), 2, "{mine}");
    let check = console::run_line(&engine, &mut session, &format!("check AB123 {} {}", at(11), at(13)))
        .await
        .unwrap();
    assert_eq!(check, format!("free during [{}, {}], would cost 30.00", at(11), at(13)));
}
