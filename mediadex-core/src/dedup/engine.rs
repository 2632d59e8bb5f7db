use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mediadex_model::{
    DetectionMethod, DuplicateDetectionRequest, DuplicateGroup, DuplicateGroupStatus,
    DuplicateItem, MediaType, SimilarityAnalysis,
};

use crate::cache::CacheService;
use crate::catalog::DuplicateGroupRepository;
use crate::config::DedupSettings;
use crate::dedup::groups::{ScoredPair, elect_primary, merge_pairs};
use crate::dedup::items::build_item;
use crate::dedup::{fingerprint, metadata, text};
use crate::error::{CatalogError, Result};

/// Providers whose cached lookups may contribute external ids to items that
/// the scanner did not tag.
const ENRICHMENT_PROVIDERS: [&str; 3] = ["tmdb", "musicbrainz", "openlibrary"];

/// Groups items that refer to the same underlying work.
///
/// Candidate loading pages through the catalog; pairwise scoring fans out on
/// rayon; the union-find accumulation and primary election run single
/// threaded per media type, which keeps the output deterministic.
#[derive(Debug)]
pub struct DuplicateEngine {
    repo: DuplicateGroupRepository,
    cache: Arc<CacheService>,
    settings: DedupSettings,
}

impl DuplicateEngine {
    pub fn new(pool: PgPool, cache: Arc<CacheService>, settings: DedupSettings) -> Self {
        Self {
            repo: DuplicateGroupRepository::new(pool),
            cache,
            settings,
        }
    }

    /// Run one detection pass and persist the resulting groups.
    ///
    /// A failure while persisting one media type's groups logs and moves on;
    /// only candidate loading errors and cancellation abort the run.
    pub async fn detect_duplicates(
        &self,
        request: &DuplicateDetectionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<DuplicateGroup>> {
        if !(0.0..=1.0).contains(&request.min_similarity) {
            return Err(CatalogError::InvalidInput(format!(
                "min_similarity out of range: {}",
                request.min_similarity
            )));
        }

        let items = self.load_candidates(request, cancel).await?;
        info!("duplicate detection over {} candidate items", items.len());

        let mut by_type: BTreeMap<MediaType, Vec<DuplicateItem>> = BTreeMap::new();
        for item in items {
            by_type.entry(item.media_type).or_default().push(item);
        }

        let mut all_groups = Vec::new();
        for (media_type, items) in by_type {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled(
                    "duplicate detection cancelled".to_string(),
                ));
            }
            if items.len() < 2 {
                continue;
            }

            debug!("comparing {} {} items", items.len(), media_type);
            let mut groups = group_media_items(
                &items,
                request.min_similarity,
                &request.detection_methods,
                request.user_id,
            );

            for group in &mut groups {
                match self.repo.persist(group).await {
                    Ok(id) => group.id = Some(id),
                    Err(err) => {
                        // One media type's persistence trouble must not sink
                        // the whole run.
                        warn!("failed to persist {} duplicate group: {}", media_type, err);
                    }
                }
            }
            all_groups.extend(groups);
        }

        all_groups.sort_by_key(|group| (group.media_type, group.primary_item.file_id));
        info!("duplicate detection produced {} groups", all_groups.len());
        Ok(all_groups)
    }

    async fn load_candidates(
        &self,
        request: &DuplicateDetectionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<DuplicateItem>> {
        let batch = if request.batch_size == 0 {
            self.settings.batch_size
        } else {
            request.batch_size
        } as i64;

        let skip = if request.include_existing {
            HashSet::new()
        } else {
            self.repo.grouped_file_ids().await?
        };

        let mut items = Vec::new();
        let mut offset = 0i64;
        loop {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled(
                    "duplicate detection cancelled".to_string(),
                ));
            }

            let page = self
                .repo
                .candidates(&request.include_paths, &request.exclude_paths, batch, offset)
                .await?;
            let page_len = page.len();

            for (file, meta) in page {
                if skip.contains(&file.id) {
                    continue;
                }
                let mut item = build_item(file, meta);
                if !request.media_types.is_empty()
                    && !request.media_types.contains(&item.media_type)
                {
                    continue;
                }
                self.enrich_from_cache(&mut item).await;
                items.push(item);
            }

            if page_len < batch as usize {
                break;
            }
            offset += batch;
        }

        Ok(items)
    }

    /// Overlay external ids from cached provider lookups. Cache trouble
    /// never fails detection.
    async fn enrich_from_cache(&self, item: &mut DuplicateItem) {
        if !item.external_ids.is_empty() {
            return;
        }

        for provider in ENRICHMENT_PROVIDERS {
            match self
                .cache
                .get_media_metadata::<BTreeMap<String, String>>(
                    item.file_id.as_i64(),
                    "external_ids",
                    provider,
                )
                .await
            {
                Ok(Some(ids)) => {
                    for (namespace, value) in ids {
                        item.external_ids.entry(namespace).or_insert(value);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        "cached external-id lookup failed for file {}: {}",
                        item.file_id, err
                    );
                }
            }
        }
    }
}

/// Pure grouping over one media type's items. Exposed for callers that
/// already hold their candidates (and for tests).
pub fn group_media_items(
    items: &[DuplicateItem],
    min_similarity: f64,
    methods: &[DetectionMethod],
    user_id: Option<Uuid>,
) -> Vec<DuplicateGroup> {
    if items.len() < 2 {
        return Vec::new();
    }

    let index_pairs: Vec<(usize, usize)> = (0..items.len())
        .flat_map(|i| ((i + 1)..items.len()).map(move |j| (i, j)))
        .collect();

    let scored: Vec<ScoredPair> = index_pairs
        .par_iter()
        .filter_map(|&(left, right)| {
            let analysis = analyze_pair(&items[left], &items[right], methods);
            (analysis.overall_score >= min_similarity).then(|| ScoredPair {
                left,
                right,
                analysis,
            })
        })
        .collect();

    let mut groups = Vec::new();
    for (members, strongest) in merge_pairs(items.len(), &scored) {
        let member_set: HashSet<usize> = members.iter().copied().collect();
        let auto_resolved = scored
            .iter()
            .filter(|pair| member_set.contains(&pair.left))
            .any(|pair| pair.analysis.hash_match || pair.analysis.external_id_match);
        let detection_method = if scored
            .iter()
            .filter(|pair| member_set.contains(&pair.left))
            .any(|pair| pair.analysis.hash_match)
        {
            DetectionMethod::Hash
        } else if auto_resolved {
            DetectionMethod::ExternalId
        } else {
            DetectionMethod::Composite
        };

        let refs: Vec<&DuplicateItem> = members.iter().map(|&i| &items[i]).collect();
        let primary_index = elect_primary(&refs);
        let primary_item = refs[primary_index].clone();
        let duplicate_items: Vec<DuplicateItem> = refs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_index)
            .map(|(_, item)| (*item).clone())
            .collect();

        groups.push(DuplicateGroup {
            id: None,
            media_type: primary_item.media_type,
            primary_item,
            duplicate_items,
            confidence: strongest.overall_score,
            detection_method,
            status: DuplicateGroupStatus::Pending,
            auto_resolved,
            detected_by: user_id,
            detected_at: Utc::now(),
        });
    }

    groups
}

/// Similarity of one unordered pair, strongest signal first.
///
/// Order matters: an exact content hash ends the comparison at 1.0, a shared
/// external id at 0.95, and only then does the weighted composite run.
pub fn analyze_pair(
    a: &DuplicateItem,
    b: &DuplicateItem,
    methods: &[DetectionMethod],
) -> SimilarityAnalysis {
    let allowed =
        |method: DetectionMethod| methods.is_empty() || methods.contains(&method);

    if allowed(DetectionMethod::Hash)
        && let (Some(ha), Some(hb)) = (a.hash.as_deref(), b.hash.as_deref())
        && !ha.is_empty()
        && ha == hb
    {
        return SimilarityAnalysis {
            overall_score: 1.0,
            hash_match: true,
            matching_fields: vec!["file_hash".to_string()],
            ..Default::default()
        };
    }

    if allowed(DetectionMethod::ExternalId) {
        for (namespace, left) in &a.external_ids {
            if left.is_empty() {
                continue;
            }
            if b.external_ids.get(namespace) == Some(left) {
                return SimilarityAnalysis {
                    overall_score: 0.95,
                    external_id_match: true,
                    matching_fields: vec![format!("external:{namespace}")],
                    ..Default::default()
                };
            }
        }
    }

    if !allowed(DetectionMethod::Composite) {
        return SimilarityAnalysis::default();
    }

    let title_score = (!a.title.trim().is_empty() && !b.title.trim().is_empty())
        .then(|| text::similarity(&a.title, &b.title));
    let metadata_score = metadata::metadata_similarity(a, b);
    let fingerprint_score = fingerprint::fingerprint_similarity(&a.fingerprints, &b.fingerprints);
    let file_score = metadata::file_similarity(a, b);

    let (title_w, metadata_w, fingerprint_w, file_w) = weights(a.media_type);
    let weighted = [
        (title_score, title_w, "title"),
        (metadata_score, metadata_w, "metadata"),
        (fingerprint_score, fingerprint_w, "fingerprint"),
        (file_score, file_w, "file"),
    ];

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut matching_fields = Vec::new();
    for (score, weight, field) in weighted {
        let Some(score) = score else {
            continue;
        };
        numerator += score * weight;
        denominator += weight;
        if score >= 0.8 {
            matching_fields.push(field.to_string());
        }
    }

    let overall_score = if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    };

    SimilarityAnalysis {
        overall_score,
        title_score,
        metadata_score,
        fingerprint_score,
        file_score,
        hash_match: false,
        external_id_match: false,
        matching_fields,
    }
}

/// (title, metadata, fingerprint, file) weights per media type.
fn weights(media_type: MediaType) -> (f64, f64, f64, f64) {
    match media_type {
        MediaType::Music => (0.40, 0.40, 0.15, 0.05),
        MediaType::Movie | MediaType::TvShow => (0.50, 0.30, 0.10, 0.10),
        _ => (0.40, 0.30, 0.20, 0.10),
    }
}
