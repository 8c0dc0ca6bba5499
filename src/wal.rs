use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_EVENT_LEN;
use crate::model::Event;

const LEN_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_EVENT_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "event too large"));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read `buf.len()` bytes; `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next record. `Ok(None)` marks the end of the valid prefix.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; LEN_BYTES as usize];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_EVENT_LEN {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; CRC_BYTES as usize];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, LEN_BYTES + len as u64 + CRC_BYTES))),
        Err(_) => Ok(None),
    }
}

/// Result of reading a log from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// Bytes after the valid prefix (torn or corrupt tail).
    pub discarded_bytes: u64,
}

/// Append-only booking log.
///
/// Format per entry: `[u32 LE: len][bincode: Event][u32 LE: crc32]`.
/// Replay stops at the first truncated or corrupt entry; opening the log cuts
/// that tail off so later appends stay reachable.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, truncated to `valid_len` bytes.
    /// Pass [`Replay::valid_len`] from a preceding [`Wal::replay`].
    pub fn open(path: &Path, valid_len: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        drop(file);
        Self::open_append(path)
    }

    fn open_append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one event and fsync. Tests only; the engine batches through
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event without flushing.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered events and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to the side file and fsync it. Slow phase.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the log and reopen it. Fast phase.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        *self = Self::open_append(&self.path)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every valid event from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        while let Some((event, size)) = decode_event(&mut reader)? {
            replay.events.push(event);
            replay.valid_len += size;
        }
        replay.discarded_bytes = total - replay.valid_len;
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interval;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fleetbook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn vehicle(plate: &str) -> Event {
        Event::VehicleAdded {
            plate: plate.into(),
            model: "Corolla".into(),
            hourly_rate: 1500,
        }
    }

    fn confirmed(plate: &str, start: i64, end: i64) -> Event {
        Event::BookingConfirmed {
            id: Ulid::new(),
            plate: plate.into(),
            client: "a@example.com".into(),
            interval: Interval::new(start, end).unwrap(),
            cost: 1500,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![vehicle("AB123"), confirmed("AB123", 1000, 2000)];
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert_eq!(replay.discarded_bytes, 0);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_discarded_and_cut_on_open() {
        let path = tmp_path("torn_tail.wal");
        let first = vehicle("AB123");
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // partial length + some bytes
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first.clone()]);
        assert_eq!(replay.discarded_bytes, 6);

        // Appending after reopening must stay replayable.
        let second = vehicle("CD456");
        {
            let mut wal = Wal::open(&path, replay.valid_len).unwrap();
            wal.append(&second).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, second]);
        assert_eq!(replay.discarded_bytes, 0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt_crc.wal");
        let event = Event::VehicleRemoved { plate: "AB123".into() };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(replay.discarded_bytes > 0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_length_prefix_is_a_corrupt_tail() {
        let path = tmp_path("oversized_len.wal");
        let first = vehicle("AB123");
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0xAB; 16]).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first]);
        assert_eq!(replay.discarded_bytes, 20);

        let just_over = (MAX_EVENT_LEN as u32 + 1).to_le_bytes();
        let mut f = File::create(&path).unwrap();
        f.write_all(&just_over).unwrap();
        drop(f);
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.discarded_bytes, 4);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&vehicle("AB123")).unwrap();
        for i in 0..10 {
            let booked = confirmed("AB123", i * 100, i * 100 + 50);
            let id = match &booked {
                Event::BookingConfirmed { id, .. } => *id,
                _ => unreachable!(),
            };
            wal.append(&booked).unwrap();
            wal.append(&Event::BookingCancelled { id, plate: "AB123".into() }).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 21);
        let before = fs::metadata(&path).unwrap().len();

        let compacted = vec![vehicle("AB123")];
        wal.compact(&compacted).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should be smaller: {after} < {before}");

        let late = confirmed("AB123", 5000, 6000);
        wal.append(&late).unwrap();
        drop(wal);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![compacted[0].clone(), late]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_land_after_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|i| vehicle(&format!("CAR{i}"))).collect();
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap().events, events);
        let _ = fs::remove_file(&path);
    }
}
