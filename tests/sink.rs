use call_logger::sink::Sink;
use std::fs;
use std::sync::Arc;
use std::thread;

fn record(thread: usize, n: usize) -> String {
    format!("[DEBUG-AGENT] Method 't{thread}' was called!\n param0= {n}\n---- captured stack ----\n")
}

#[test]
fn appends_records_and_creates_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calls.log");
    let sink = Sink::new(false, Some(path.clone()));

    sink.emit("first\n");
    sink.emit("second\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn existing_content_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calls.log");
    fs::write(&path, "old\n").unwrap();

    Sink::new(false, Some(path.clone())).emit("new\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
}

#[test]
fn file_errors_are_swallowed() {
    let dir = tempfile::tempdir().unwrap();
    // a directory cannot be opened for append
    let sink = Sink::new(true, Some(dir.path().to_path_buf()));
    sink.emit("lost\n");

    let missing_parent = Sink::new(false, Some(dir.path().join("no/such/dir/calls.log")));
    missing_parent.emit("lost\n");
}

#[test]
fn no_destinations_is_a_no_op() {
    let sink = Sink::new(false, None);
    assert!(!sink.is_enabled());
    assert!(!sink.console_enabled());
    assert!(sink.file().is_none());
    sink.emit("nowhere\n");
}

#[test]
fn any_destination_enables_the_sink() {
    assert!(Sink::new(true, None).is_enabled());
    assert!(Sink::new(false, Some("calls.log".into())).is_enabled());
    assert!(!Sink::default().is_enabled());
}

#[test]
fn concurrent_records_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calls.log");
    let sink = Arc::new(Sink::new(false, Some(path.clone())));

    let threads = 8;
    let per_thread = 200;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for n in 0..per_thread {
                    sink.emit(&record(t, n));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), threads * per_thread * 3);
    for chunk in lines.chunks(3) {
        assert!(chunk[0].starts_with("[DEBUG-AGENT] Method 't"), "{chunk:?}");
        assert!(chunk[1].starts_with(" param0= "), "{chunk:?}");
        assert_eq!(chunk[2], "---- captured stack ----");
    }
    for t in 0..threads {
        let count = lines.iter().filter(|l| **l == format!("[DEBUG-AGENT] Method 't{t}' was called!")).count();
        assert_eq!(count, per_thread);
    }
}
