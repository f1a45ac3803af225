//! End-to-end tests driving the buffer, indexers, and wrap layer together
//! the way an editor front-end would.

use std::fs;
use std::io::Write;
use vbuf::{LazyLineIndexer, VirtualBuffer, VisualLineMapper};

#[test]
fn edit_session_over_loaded_text() {
    let mut buffer = VirtualBuffer::new();
    buffer.load_text("ab\ncd\nef");

    assert_eq!(buffer.total_lines(), 3);
    assert_eq!(buffer.get_line(1), "cd");

    let end = buffer.insert(1, 2, "XY");
    assert_eq!(end, (1, 4));
    assert_eq!(buffer.get_text(), "ab\ncdXY\nef");

    let deleted = buffer.delete(0, 0, 1, 0);
    assert_eq!(deleted, "ab\n");
    assert_eq!(buffer.get_text(), "cdXY\nef");
    assert_eq!(buffer.total_lines(), buffer.get_text().split('\n').count());
}

#[test]
fn file_session_with_save_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();

    let mut buffer = VirtualBuffer::new();
    buffer.load_file(&path).unwrap();
    assert_eq!(buffer.total_lines(), 4);

    let (deleted, end_line, end_col) = buffer.replace(1, 0, 1, 4, "BETA");
    assert_eq!(deleted, "beta");
    assert_eq!((end_line, end_col), (1, 4));
    assert!(buffer.is_modified());

    buffer.save_to_file(None).unwrap();
    assert!(!buffer.is_modified());
    assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\nBETA\ngamma\n");

    // Reload re-lazified the buffer against the new file
    let mut reloaded = VirtualBuffer::new();
    reloaded.load_file(&path).unwrap();
    assert_eq!(reloaded.get_text(), buffer.get_text());
}

#[test]
fn large_file_opens_lazily_and_indexes_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.txt");
    let mut file = fs::File::create(&path).unwrap();
    for i in 0..50_000 {
        writeln!(file, "{:049}", i).unwrap();
    }
    drop(file);

    let mut indexer = LazyLineIndexer::open(&path).unwrap();
    assert!(!indexer.is_fully_indexed());

    // Scrollbar gets an instant estimate in the right ballpark
    let estimate = indexer.estimated_line_count();
    assert!(estimate > 10_000 && estimate < 200_000);

    // A viewport read touches only a bounded prefix
    indexer.ensure_lines_indexed(0, 99);
    assert!(indexer.actual_line_count() < 1_000);
    assert_eq!(indexer.get_line(42), format!("{:049}", 42));

    // Drive background indexing to completion like an idle loop would
    indexer.start_background_indexing(|_| {});
    while indexer.background_step() {}
    assert!(indexer.is_fully_indexed());
    assert_eq!(indexer.estimated_line_count(), 50_001);
}

#[test]
fn wrap_layer_tracks_buffer_edits() {
    let mut buffer = VirtualBuffer::new();
    buffer.load_text("the quick brown fox jumps\nshort");

    let mut mapper = VisualLineMapper::new();
    mapper.set_enabled(true);
    mapper.set_char_width(10);

    assert_eq!(mapper.get_visual_line_count(&mut buffer, 0), 3);
    let segments = mapper.get_line_segments(&mut buffer, 0);
    assert_eq!(segments, vec![(0, 10), (10, 20), (20, 25)]);

    buffer.insert(1, 5, " text that stretches well past ten characters");
    mapper.invalidate(1, 1);
    assert!(mapper.get_visual_line_count(&mut buffer, 1) > 1);

    let total = mapper.get_total_visual_lines(&mut buffer);
    assert!(total >= buffer.total_lines());
}
