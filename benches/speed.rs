//! MFM encode/decode throughput and sector-cache hit latency.

extern crate criterion;

use criterion::{criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration, Throughput};

use pico_floppy::cache::{cache_key, SectorCache};
use pico_floppy::fat::types::{Cluster, Lba};
use pico_floppy::media::{MediaIo, Sector, Track};
use pico_floppy::mfm::decode::Decoder;
use pico_floppy::mfm::encode::Encoder;
use pico_floppy::SECTOR_SIZE;

fn sample_track(cylinder: u8, head: u8) -> Track {
    let mut track = Track::blank(cylinder, head);
    for (i, sector) in track.sectors.iter_mut().enumerate() {
        for (j, byte) in sector.data.iter_mut().enumerate() {
            *byte = ((i * 37 + j) % 256) as u8;
        }
        sector.valid = true;
    }
    track
}

fn bench_mfm_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("mfm encode");
    group.throughput(Throughput::Bytes((SECTOR_SIZE * 18) as u64));

    let track = sample_track(40, 0);
    group.bench_function("encode_track", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new();
            encoder.encode_track(&track);
            encoder.bytes().len()
        })
    });
}

fn bench_mfm_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("mfm decode");
    group.throughput(Throughput::Bytes((SECTOR_SIZE * 18) as u64));

    let track = sample_track(40, 0);
    let mut encoder = Encoder::new();
    encoder.encode_track(&track);
    let pulses: Vec<u8> = encoder.bytes().to_vec();

    let deltas: Vec<u16> = pulses.iter().map(|&w| w as u16).collect();

    group.bench_function("decode_track", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let mut found = 0;
            for &delta in deltas.iter() {
                if decoder.feed(delta).is_some() {
                    found += 1;
                }
            }
            found
        })
    });
}

struct NullMedia;

impl MediaIo for NullMedia {
    fn read(&mut self, sector: &mut Sector) -> bool {
        sector.valid = true;
        true
    }
    fn write(&mut self, _track: &mut Track) -> bool {
        true
    }
    fn disk_changed(&mut self) -> bool {
        false
    }
    fn write_protected(&mut self) -> bool {
        false
    }
}

fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("sector cache");

    let mut cache: SectorCache<64> = SectorCache::new();
    let mut media = NullMedia;
    for sector_n in 1..=18u8 {
        cache.read_through(&mut media, 40, 0, sector_n);
    }

    group.bench_function("cached_read", |b| {
        b.iter(|| cache.get(cache_key(40, 0, 9)).map(|s| s.data[0]))
    });

    group.bench_function("lba_to_chs", |b| {
        b.iter(|| Lba::new(659).to_chs(2, 18))
    });

    let _ = Cluster::new(2);
}

criterion_group!(benches, bench_mfm_encode, bench_mfm_decode, bench_cache_hit);
criterion_main!(benches);
