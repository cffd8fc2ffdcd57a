use crate::unit_tests::fixtures::MemFixture;

#[test]
fn write_then_read_back() {
    let mut fixture = MemFixture::new(64);
    fixture.write_byte(0x00, 0x08);
    fixture.write_byte(0x01, 0x09);
    fixture.write_byte(0x02, 0x10);

    assert_eq!(fixture.read_byte(0x01), 0x09);
    assert_eq!(fixture.read_byte(0x00), 0x08);
    assert_eq!(fixture.read_byte(0x02), 0x10);
}

#[test]
fn ack_pulses_and_handshake_closes() {
    let mut fixture = MemFixture::new(64);
    fixture.addr.write(0x03);
    fixture.data_wr.write(0x42);
    fixture.w_en.write(true);

    fixture.sched.run(2);
    assert!(fixture.ack_out.read(), "ack should rise after the beat");

    fixture.w_en.write(false);
    fixture.ack_in.write(true);
    fixture.sched.run(2);
    assert!(!fixture.ack_out.read(), "ack should fall once the caller acks");
    fixture.ack_in.write(false);

    assert_eq!(fixture.mem.read().expect("lock poisoned").peek_span(0x03, 1), vec![0x42]);
}

#[test]
fn read_wins_over_simultaneous_write() {
    let mut fixture = MemFixture::new(64);
    fixture.write_byte(0x05, 0xaa);

    // Both enables up: the read is honoured, the write is not.
    fixture.addr.write(0x05);
    fixture.data_wr.write(0xbb);
    fixture.w_en.write(true);
    fixture.r_en.write(true);
    fixture.sched.run(2);

    assert_eq!(fixture.data_rd.read(), 0xaa);
    assert_eq!(fixture.mem.read().expect("lock poisoned").peek_span(0x05, 1), vec![0xaa]);
}

#[test]
fn reset_zeroes_cells_and_outputs() {
    let mut fixture = MemFixture::new(64);
    fixture.write_byte(0x07, 0x77);
    assert_eq!(fixture.read_byte(0x07), 0x77);

    fixture.rst.write(true);
    fixture.sched.run(2);

    assert!(!fixture.ack_out.read());
    assert_eq!(fixture.data_rd.read(), 0);
    assert_eq!(fixture.mem.read().expect("lock poisoned").peek_span(0, 64), vec![0; 64]);
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_access_is_fatal() {
    let mut fixture = MemFixture::new(64);
    fixture.addr.write(64);
    fixture.r_en.write(true);
    fixture.sched.run(2);
}

#[test]
fn dump_formats_hex_rows() {
    let mut fixture = MemFixture::new(64);
    fixture.write_byte(0x00, 0xab);
    let dump = fixture.mem.read().expect("lock poisoned").dump_span(0, 32);
    assert!(dump.starts_with("0x0000: ab00"), "{dump}");
}
