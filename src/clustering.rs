//! Spatio-temporal hotspot detection.
//!
//! Density-based clustering (DBSCAN) over great-circle distance, optionally
//! restricted to a rolling onset window. Points are visited in a canonical
//! order so the result does not depend on the order they were supplied in.

use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::config::AlertSettings;
use crate::temporal::onset_in_window;

/// Mean Earth radius in kilometres, as used for haversine DBSCAN.
pub const KMS_PER_RADIAN: f64 = 6371.0088;

const EARTH_RADIUS_METERS: f64 = KMS_PER_RADIAN * 1000.0;

/// Fewer qualifying points than this never form a cluster.
const MIN_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub date: Option<NaiveDate>,
}

impl ClusterPoint {
    pub fn new(latitude: f64, longitude: f64, date: Option<NaiveDate>) -> Self {
        Self {
            latitude,
            longitude,
            date,
        }
    }

    fn geo(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub radius_meters: f64,
    /// Neighbours (the point itself included) a core point needs.
    pub min_members: usize,
    pub time_window_days: Option<u32>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            radius_meters: 2000.0,
            min_members: 3,
            time_window_days: None,
        }
    }
}

impl From<&AlertSettings> for ClusterParams {
    fn from(alerts: &AlertSettings) -> Self {
        Self {
            radius_meters: alerts.cluster_radius_meters,
            min_members: alerts.cluster_min_members,
            time_window_days: alerts.cluster_time_window_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub latitude: f64,
    pub longitude: f64,
    pub count: usize,
    pub mean_date: Option<NaiveDateTime>,
    /// Indices into the input slice, ascending.
    pub members: Vec<usize>,
}

/// Detect clusters relative to the current local time.
pub fn detect_clusters(points: &[ClusterPoint], params: &ClusterParams) -> Vec<Cluster> {
    detect_clusters_at(points, params, Local::now().naive_local())
}

pub fn detect_clusters_at(
    points: &[ClusterPoint],
    params: &ClusterParams,
    now: NaiveDateTime,
) -> Vec<Cluster> {
    if points.len() < MIN_POINTS {
        return Vec::new();
    }

    let mut eligible: Vec<usize> = (0..points.len()).collect();
    if let Some(days) = params.time_window_days {
        // Undated points only survive when nothing is dated
        if points.iter().any(|p| p.date.is_some()) {
            eligible.retain(|&i| points[i].date.is_some_and(|d| onset_in_window(d, now, days)));
        }
        if eligible.len() < MIN_POINTS {
            tracing::debug!(eligible = eligible.len(), window_days = days, "Too few points in window");
            return Vec::new();
        }
    }

    eligible.sort_by(|&a, &b| canonical_cmp(&points[a], &points[b]));
    let ordered: Vec<ClusterPoint> = eligible.iter().map(|&i| points[i]).collect();

    let epsilon = params.radius_meters / 1000.0 / KMS_PER_RADIAN;
    let labels = dbscan(&ordered, epsilon, params.min_members.max(1));

    let n_clusters = labels.iter().flatten().max().map_or(0, |m| m + 1);
    let mut clusters = Vec::with_capacity(n_clusters);
    for label in 0..n_clusters {
        let ranks: Vec<usize> = (0..ordered.len())
            .filter(|&r| labels[r] == Some(label))
            .collect();
        let mut members: Vec<usize> = ranks.iter().map(|&r| eligible[r]).collect();
        members.sort_unstable();
        clusters.push(summarize(&ranks, &ordered, members));
    }

    tracing::debug!(
        points = points.len(),
        eligible = ordered.len(),
        clusters = clusters.len(),
        "Cluster detection complete"
    );
    clusters
}

fn canonical_cmp(a: &ClusterPoint, b: &ClusterPoint) -> Ordering {
    a.latitude
        .total_cmp(&b.latitude)
        .then(a.longitude.total_cmp(&b.longitude))
        .then(a.date.cmp(&b.date))
}

/// Central angle between two points, in radians.
fn angular_distance(a: &ClusterPoint, b: &ClusterPoint) -> f64 {
    a.geo().haversine_distance(&b.geo()) / EARTH_RADIUS_METERS
}

/// Cluster label per point; `None` is noise. Labels are numbered in the
/// order their first core point is reached.
fn dbscan(points: &[ClusterPoint], epsilon: f64, min_members: usize) -> Vec<Option<usize>> {
    let neighbourhoods: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            (0..points.len())
                .filter(|&j| angular_distance(p, &points[j]) <= epsilon)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbourhoods.iter().map(|n| n.len() >= min_members).collect();

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut next_label = 0;
    for seed in 0..points.len() {
        if labels[seed].is_some() || !is_core[seed] {
            continue;
        }
        labels[seed] = Some(next_label);
        let mut queue: VecDeque<usize> = VecDeque::from([seed]);
        while let Some(current) = queue.pop_front() {
            for &neighbour in &neighbourhoods[current] {
                if labels[neighbour].is_some() {
                    continue;
                }
                labels[neighbour] = Some(next_label);
                if is_core[neighbour] {
                    queue.push_back(neighbour);
                }
            }
        }
        next_label += 1;
    }
    labels
}

fn summarize(ranks: &[usize], ordered: &[ClusterPoint], members: Vec<usize>) -> Cluster {
    let count = ranks.len();
    let n = count as f64;
    let latitude = ranks.iter().map(|&r| ordered[r].latitude).sum::<f64>() / n;
    let longitude = ranks.iter().map(|&r| ordered[r].longitude).sum::<f64>() / n;

    let stamps: Vec<i64> = ranks
        .iter()
        .filter_map(|&r| ordered[r].date)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
        .collect();
    let mean_date = if stamps.is_empty() {
        None
    } else {
        let mean = stamps.iter().sum::<i64>().div_euclid(stamps.len() as i64);
        DateTime::from_timestamp(mean, 0).map(|d| d.naive_utc())
    };

    Cluster {
        latitude,
        longitude,
        count,
        mean_date,
        members,
    }
}
