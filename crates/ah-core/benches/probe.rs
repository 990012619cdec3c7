use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ah_core::config::ProbeConfig;
use ah_core::fixture::{FakeMedia, FakePlayer, StaticPage};
use ah_core::player::PlaybackTarget;
use ah_core::probe::evaluate;

fn bench_evaluate(c: &mut Criterion) {
    let config = ProbeConfig::default();
    let media = FakeMedia::new(0.7);
    media.set_source(Some("https://r3.googlevideo.com/videoplayback?id=1&itag=18"));
    let player = FakePlayer::new();
    let page = StaticPage::new("https://www.youtube.com/watch?v=bench")
        .with_element("#movie_player")
        .with_hidden(".ytp-ad-player-overlay")
        .with_text(".ytp-ad-text", "Up next")
        .with_media("video", media.clone())
        .with_player("#movie_player", player.clone());
    let target = PlaybackTarget {
        media,
        player: Some(player),
        generation: 0,
    };

    c.bench_function("evaluate_content_page", |b| {
        b.iter(|| evaluate(black_box(&page), Some(&target), &config))
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
