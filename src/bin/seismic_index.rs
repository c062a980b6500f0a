//! Builds a one-field SEISMIC index from a line-delimited sparse-vector file
//! and runs a single query against it end to end. Grounded on
//! `fschlatt-seismic/src/bin/build_inverted_index.rs`'s CLI shape.

use clap::Parser;
use seismic_core::cache::CacheManager;
use seismic_core::clustering::{ClusteringAlgorithm, RandomClustering};
use seismic_core::codec::{SegmentFieldReader, SegmentFieldWriter};
use seismic_core::core::config::{CircuitBreakerLimit, FieldMappingParameters};
use seismic_core::core::types::{CacheKey, FieldId, SegmentId};
use seismic_core::forward_index::ForwardIndex;
use seismic_core::postings_store::ClusteredPostingIndex;
use seismic_core::scorer::QueryScorer;
use seismic_core::sparse::{DocWeight, SparseVector};
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Build and query a SEISMIC-style index", long_about = None)]
struct Args {
    /// Line-delimited input: `doc_id token:weight token:weight ...` per line.
    #[clap(short, long, value_parser)]
    input_file: String,

    /// Query to run after building, same `token:weight` syntax (no doc id).
    #[clap(short, long, value_parser)]
    query: String,

    #[clap(short, long, value_parser, default_value_t = 6000)]
    n_postings: i64,

    #[clap(short, long, value_parser, default_value_t = 0.1)]
    cluster_ratio: f32,

    #[clap(short, long, value_parser, default_value_t = 0.4)]
    summary_prune_ratio: f32,

    #[clap(short, long, value_parser, default_value_t = 10)]
    k: usize,

    #[clap(long, value_parser, default_value_t = 4)]
    query_cut: usize,

    #[clap(long, value_parser, default_value_t = 1.0)]
    heap_factor: f32,
}

fn parse_line(line: &str) -> Option<(i32, Vec<(u32, f32)>)> {
    let mut parts = line.split_whitespace();
    let doc_id: i32 = parts.next()?.parse().ok()?;
    let mut pairs = Vec::new();
    for tok in parts {
        let (token, weight) = tok.split_once(':')?;
        pairs.push((token.parse().ok()?, weight.parse().ok()?));
    }
    Some((doc_id, pairs))
}

fn parse_query(s: &str) -> Vec<(u32, f32)> {
    s.split_whitespace()
        .filter_map(|tok| {
            let (token, weight) = tok.split_once(':')?;
            Some((token.parse().ok()?, weight.parse().ok()?))
        })
        .collect()
}

fn main() {
    let args = Args::parse();
    let field_params = FieldMappingParameters {
        n_postings: args.n_postings,
        summary_prune_ratio: args.summary_prune_ratio,
        cluster_ratio: args.cluster_ratio,
        ..FieldMappingParameters::default()
    };
    field_params.validate().expect("invalid field parameters");

    let raw = fs::read_to_string(&args.input_file).expect("failed to read input file");
    let docs: Vec<(i32, Vec<(u32, f32)>)> = raw.lines().filter_map(parse_line).collect();
    println!("Number of vectors: {}", docs.len());

    let max_doc_id = docs.iter().map(|(id, _)| *id).max().unwrap_or(-1);
    let max_token = docs
        .iter()
        .flat_map(|(_, pairs)| pairs.iter().map(|(t, _)| *t))
        .max()
        .unwrap_or(0);

    let time = Instant::now();

    let cache = CacheManager::with_budget(CircuitBreakerLimit::Bytes(1 << 30), 0);
    let segment_id = SegmentId::new();
    let field_id = FieldId(0);
    let key = CacheKey::new(segment_id, field_id);
    cache.register_overhead(
        key,
        ForwardIndex::empty_ram_bytes((max_doc_id + 1) as usize),
        ClusteredPostingIndex::empty_ram_bytes(),
    );

    let forward = ForwardIndex::new((max_doc_id + 1) as usize);
    let mut inverted: BTreeMap<u32, Vec<DocWeight>> = BTreeMap::new();

    for (doc_id, pairs) in &docs {
        let vector = SparseVector::from_float_pairs(pairs).expect("weight out of quantizable range");
        for (token, weight) in vector.iter() {
            inverted.entry(token).or_default().push(DocWeight::new(*doc_id, weight));
        }
        forward
            .insert(*doc_id, vector, &cache, key)
            .expect("forward index insert refused by cache budget");
    }

    let postings = ClusteredPostingIndex::new();
    let algo = RandomClustering::new(field_params.cluster_ratio, field_params.summary_prune_ratio)
        .expect("invalid clustering configuration");
    let mut rng = rand::rngs::StdRng::from_entropy();

    let n_postings = field_params.resolved_n_postings(docs.len());
    for (token, mut posting) in inverted {
        posting.sort_unstable_by_key(|d| d.doc_id);
        if posting.len() > n_postings {
            posting.truncate(n_postings);
        }
        let clusters = algo
            .cluster(&posting, &forward, max_token + 1, &mut rng)
            .expect("clustering failed");
        postings
            .insert(
                &token.to_be_bytes(),
                seismic_core::clustering::PostingClusters::new(clusters),
                &cache,
                key,
            )
            .expect("posting insert refused by cache budget");
    }

    println!("Index built in {:.2?}", time.elapsed());

    // Seal to a segment file pair and reopen through the codec, exercising
    // the full write -> read round trip end to end.
    let mut writer = SegmentFieldWriter::new(segment_id);
    for term in postings.get_terms() {
        let clusters = postings.read(&term).expect("term vanished while sealing");
        writer.write_term(&term, &clusters).expect("write_term failed");
    }
    let (dict_bytes, postings_bytes) = writer.finish().expect("failed to seal segment");
    let reader = SegmentFieldReader::open(&dict_bytes, &postings_bytes).expect("failed to reopen segment");
    println!("Sealed and reopened segment with {} terms", reader.term_count());

    let query_pairs = parse_query(&args.query);
    let mut sorted_by_weight = query_pairs.clone();
    sorted_by_weight.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    sorted_by_weight.truncate(args.query_cut);
    let query = SparseVector::from_float_pairs(&sorted_by_weight).expect("query weight out of range");
    let query_dense = query.to_dense(max_token.max(1));

    let scorer = QueryScorer::new(&postings, &forward);
    let cancelled = AtomicBool::new(false);
    let hits = scorer
        .search(&query, &query_dense, args.k, args.heap_factor, None, &cancelled)
        .expect("search failed");

    println!("Top {} hits (docId, score):", hits.len());
    for (doc_id, score) in hits {
        println!("  {doc_id}\t{score}");
    }
}
