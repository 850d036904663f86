use logstreamer::ansi::{AnsiDecoder, parse_ansi};
use std::time::{Duration, Instant};

/// Log lines shaped like what services print, with colored level and source
fn generate_ansi_messages(count: usize) -> Vec<String> {
    let red = "\x1b[31m";
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let blue = "\x1b[34m";
    let reset = "\x1b[0m";
    let bold = "\x1b[1m";

    (0..count)
        .map(|i| match i % 4 {
            0 => format!("{}web{}: {}INFO{} GET /orders/{} {}200{} in 25ms", blue, reset, green, reset, i, bold, reset),
            1 => format!("{}worker{}: {}ERROR{} job #{} failed", blue, reset, red, reset, i),
            2 => format!("{}api{}: {}WARN{} slow query ({}{}ms{})", blue, reset, yellow, reset, bold, i % 900, reset),
            _ => format!("{}mailer{}: sent digest to user{}@example.com", blue, reset, i),
        })
        .collect()
}

fn bench_uncached(messages: &[String], passes: usize) -> Duration {
    let start = Instant::now();
    for _ in 0..passes {
        for message in messages {
            let _tokens = parse_ansi(message);
        }
    }
    start.elapsed()
}

fn bench_cached(decoder: &mut AnsiDecoder, messages: &[String], passes: usize) -> Duration {
    let start = Instant::now();
    for _ in 0..passes {
        for message in messages {
            let _tokens = decoder.decode(message);
        }
    }
    start.elapsed()
}

fn main() {
    println!("=== ANSI decoder cache ===\n");

    // Each pass is one re-render of the visible records
    let passes = 60;
    for count in [100, 1_000, 5_000] {
        let messages = generate_ansi_messages(count);
        let mut decoder = AnsiDecoder::new(count * 2);

        let _ = bench_uncached(&messages, 1);
        let uncached = bench_uncached(&messages, passes);
        let cached = bench_cached(&mut decoder, &messages, passes);

        println!("--- {} messages, {} passes ---", count, passes);
        println!("  Without cache: {:?} ({:.2} ms/pass)", uncached, uncached.as_secs_f64() * 1000.0 / passes as f64);
        println!("  With cache:    {:?} ({:.2} ms/pass)", cached, cached.as_secs_f64() * 1000.0 / passes as f64);
        println!("  Speedup:       {:.1}x", uncached.as_secs_f64() / cached.as_secs_f64());
        println!("  Hits/misses:   {}/{}", decoder.hits(), decoder.misses());
        println!();
    }

    // A cache smaller than the working set keeps evicting
    let messages = generate_ansi_messages(2_000);
    let mut decoder = AnsiDecoder::new(500);
    let elapsed = bench_cached(&mut decoder, &messages, passes);
    println!("--- undersized cache (500 entries, 2000 messages) ---");
    println!("  Time:          {:?}", elapsed);
    println!("  Hits/misses:   {}/{}", decoder.hits(), decoder.misses());
}
