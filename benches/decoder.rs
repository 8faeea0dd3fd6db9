use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use onboard::core::constants::QUESTIONS_MARKER;
use onboard::core::decoder::{FeedbackPayload, StreamDecoder};
use onboard::core::follow_up::FollowUpSplice;

/// Split a response into fragments of roughly `size` bytes on char
/// boundaries, the way a provider streams tokens.
fn fragments(text: &str, size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if current.len() >= size {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn response(paragraphs: usize) -> String {
    let base = "좋은 선택입니다. 동료의 요청에 바로 응답하면 신뢰가 쌓이고 팀의 흐름이 끊기지 않습니다. ";
    let mut text = base.repeat(paragraphs);
    text.push_str(QUESTIONS_MARKER);
    text.push_str("\n다른 선택지는 왜 덜 적절한가요?\n실제로 이런 상황이 자주 있나요?\n");
    text
}

fn bench_decoder(c: &mut Criterion) {
    for &paragraphs in &[10usize, 100usize] {
        let text = response(paragraphs);
        let mut group = c.benchmark_group(format!("decoder_paragraphs{}", paragraphs));
        group.throughput(Throughput::Bytes(text.len() as u64));

        for &size in &[4usize, 32usize] {
            let parts = fragments(&text, size);

            group.bench_function(BenchmarkId::new("decode", size), |b| {
                b.iter(|| {
                    let mut decoder = StreamDecoder::default();
                    let mut payload = FeedbackPayload::default();
                    for part in &parts {
                        if let Some(appended) = decoder.push(part) {
                            payload.main_text.push_str(appended);
                        }
                    }
                    decoder.finish()
                })
            });

            group.bench_function(BenchmarkId::new("splice", size), |b| {
                b.iter(|| {
                    let mut main_text = String::from("이전 피드백");
                    let mut splice = FollowUpSplice::start(&mut main_text, "추가 질문");
                    for part in &parts {
                        splice.apply(&mut main_text, part);
                    }
                    main_text
                })
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_decoder);
criterion_main!(benches);
