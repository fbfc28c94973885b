#[macro_use]
extern crate bencher;

extern crate dsc;
use dsc::prelude::*;

use bencher::Bencher;
use std::io::Cursor;


fn picture() -> Picture {
    Picture::from_fn(Vec2(480, 270), ColorFormat::Rgb, 8, |channel, Vec2(x, y)| {
        ((x * (channel + 1) + y * 7 + (x * y) % 13) % 256) as u16
    })
}

fn compress_single_slice(bench: &mut Bencher) {
    let picture = picture();
    let setup = Parameters::default().setup(picture.size).unwrap();

    bench.iter(||{
        let encoded = compress(&setup, &picture).unwrap();
        bencher::black_box(encoded);
    })
}

fn compress_parallel_slices(bench: &mut Bencher) {
    let picture = picture();
    let parameters = Parameters { slice_size: Some(Vec2(120, 54)), .. Parameters::default() };
    let setup = parameters.setup(picture.size).unwrap();

    bench.iter(||{
        let encoded = compress(&setup, &picture).unwrap();
        bencher::black_box(encoded);
    })
}

fn decompress_parallel_slices_from_buffer(bench: &mut Bencher) {
    let picture = picture();
    let parameters = Parameters { slice_size: Some(Vec2(120, 54)), .. Parameters::default() };
    let setup = parameters.setup(picture.size).unwrap();

    let mut bytes = Vec::new();
    compress(&setup, &picture).unwrap().compressed.write(&mut bytes).unwrap();

    bench.iter(||{
        let decoded = Compressed::read(&mut Cursor::new(bytes.as_slice())).unwrap().decompress().unwrap();
        bencher::black_box(decoded);
    })
}

benchmark_group!(slices,
    compress_single_slice,
    compress_parallel_slices,
    decompress_parallel_slices_from_buffer
);

benchmark_main!(slices);
