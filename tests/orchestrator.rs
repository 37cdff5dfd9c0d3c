use std::io::Write;
use std::sync::Arc;

use ixa_contacts::{
    AgentId, ContactConfig, ContactConfigBuilder, ContactOrchestrator, Intensity, PartnerCounts,
    PoissonSampler,
};
use tempfile::NamedTempFile;

fn agents(range: std::ops::Range<usize>) -> Vec<AgentId> {
    range.map(AgentId).collect()
}

/// Twenty agents in five households of four, a workplace network active on weekdays and a
/// Wednesday class for the first ten.
fn town(config: ContactConfig) -> ContactOrchestrator {
    let mut contacts = ContactOrchestrator::new(config).unwrap();
    for family in 0..5 {
        let members = agents(4 * family..4 * family + 4);
        let home = contacts.new_permanent(format!("household {family}"));
        contacts
            .add_product_set(home, &members, &members, None)
            .unwrap();
    }
    let everyone = agents(0..20);
    let work = contacts.new_sparse("workplaces");
    contacts
        .add_product_set(
            work,
            &everyone,
            &everyone,
            Some([0.0, 0.05, 0.05, 0.05, 0.05, 0.05, 0.0]),
        )
        .unwrap();
    let class = contacts.new_context(3, "class").unwrap();
    contacts.add_transmitters(class, &everyone[..10], 1).unwrap();
    contacts.add_receivers(class, &everyone[..10], 1).unwrap();
    contacts.context_mut(class).unwrap().set_rate(0.1).unwrap();
    contacts
}

fn total(partners: &PartnerCounts) -> u32 {
    partners.values().sum()
}

#[test]
fn weekly_contacts_match_expectation() {
    let mut contacts = town(ContactConfig::default());
    let weeks = 20;
    let days: Vec<usize> = (1..=7 * weeks).collect();
    let expected: f64 = contacts.expectation(&days).values().sum();
    // Households: 5 × 12 pairs daily. Workplaces: 0.05 × 380 pairs on five days. Class: 0.1 × 100
    // on Wednesdays.
    let per_week = 7.0 * 60.0 + 5.0 * 19.0 + 10.0;
    assert!((expected - per_week * 20.0).abs() < 1e-6);

    let average = contacts.average_daily_contacts(days.len()).unwrap();
    #[allow(clippy::cast_precision_loss)]
    let realized = average * (days.len() * contacts.agent_count()) as f64;
    // The class drops self-contacts, so its yield is 90% of the nominal expectation.
    let adjusted = expected - 20.0;
    assert!(
        (realized - adjusted).abs() < 200.0,
        "realized {realized}, expected {adjusted}"
    );
}

#[test]
fn queries_only_reach_channels_meeting_that_day() {
    let mut contacts = town(ContactConfig::default());
    // Day 0 is a Sunday: only households meet.
    let sunday = contacts.query_transmit(AgentId(0), 0).unwrap();
    assert_eq!(total(&sunday), 3);
    assert!(sunday.keys().all(|partner| partner.0 < 4));

    for _ in 0..3 {
        contacts.advance_day();
    }
    let mut wednesday = 0;
    for agent in agents(0..10) {
        wednesday += total(&contacts.query_transmit(agent, 0).unwrap());
    }
    // Ten members draw three household contacts each before workplaces and the class.
    assert!(wednesday >= 30);
}

#[test]
fn contact_tracing_looks_back() {
    let mut contacts = town(ContactConfig::default());
    let everyone = agents(0..20);
    contacts
        .register_symmetric(Some(&everyone), Intensity::Constant(0.1), "errands")
        .unwrap();
    for _ in 0..3 {
        contacts.advance_day();
    }
    let wednesday: Vec<PartnerCounts> = agents(0..5)
        .into_iter()
        .map(|agent| contacts.query_contacts(agent, 0).unwrap())
        .collect();
    contacts.advance_day();
    contacts.advance_day();
    for (agent, traced) in agents(0..5).into_iter().zip(&wednesday) {
        assert_eq!(&contacts.query_contacts(agent, -2).unwrap(), traced);
    }
}

#[test]
fn quarantine_applies_to_every_channel() {
    let mut contacts = town(ContactConfig::default());
    let isolated = AgentId(5);
    assert!(contacts.absent(isolated));
    for _ in 0..7 {
        contacts.advance_day();
        for agent in agents(0..20) {
            let partners = contacts.query_contacts(agent, 0).unwrap();
            assert!(!partners.contains_key(&isolated), "{agent:?} met {isolated:?}");
        }
        assert!(contacts.query_transmit(isolated, 0).unwrap().is_empty());
    }

    assert!(contacts.present(isolated));
    // On to the next Sunday, when only households meet.
    for _ in 0..7 {
        contacts.advance_day();
    }
    let home = contacts.query_transmit(AgentId(4), 0).unwrap();
    assert_eq!(home.get(&isolated), Some(&1));
}

#[test]
fn quarantine_keeps_earlier_contacts_traceable() {
    let mut contacts = ContactOrchestrator::new(ContactConfig::default()).unwrap();
    let couple = agents(0..2);
    let home = contacts.new_permanent("home");
    contacts
        .add_product_set(home, &couple, &couple, None)
        .unwrap();
    let first = contacts.query_contacts(AgentId(1), 0).unwrap();
    assert_eq!(first.get(&AgentId(0)), Some(&2));

    // Three days pass without anyone asking about the household.
    for _ in 0..3 {
        contacts.advance_day();
    }
    assert!(contacts.absent(AgentId(1)));

    assert_eq!(contacts.query_contacts(AgentId(1), -3).unwrap(), first);
    for offset in -2..=-1 {
        let traced = contacts.query_contacts(AgentId(1), offset).unwrap();
        assert_eq!(traced.get(&AgentId(0)), Some(&2), "offset {offset}");
    }
    assert!(contacts.query_contacts(AgentId(1), 0).unwrap().is_empty());
    assert!(contacts.query_contacts(AgentId(0), 0).unwrap().is_empty());
}

#[test]
fn process_partners_agree() {
    let mut contacts = ContactOrchestrator::new(ContactConfig::default()).unwrap();
    let crowd = agents(0..100);
    contacts
        .register_symmetric(Some(&crowd), Intensity::Constant(0.05), "crowd")
        .unwrap();
    contacts.advance_day();
    let met: Vec<PartnerCounts> = crowd
        .iter()
        .map(|agent| contacts.query_transmit(*agent, 0).unwrap())
        .collect();
    for (agent, partners) in crowd.iter().zip(&met) {
        for (partner, count) in partners {
            assert_eq!(met[partner.0].get(agent), Some(count));
        }
    }
}

#[test]
fn seeded_runs_repeat() {
    let config = ContactConfigBuilder::default().seed(17).build().unwrap();
    let run = |config: ContactConfig| {
        let mut contacts = town(config);
        let mut history = Vec::new();
        for _ in 0..10 {
            contacts.advance_day();
            for agent in agents(0..20) {
                history.push(contacts.query_transmit(agent, 0).unwrap());
            }
        }
        history
    };
    assert_eq!(run(config.clone()), run(config));
}

#[test]
fn configuration_file_sets_permanent_rate() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "seed": 3, "permanent_rate": 2 }}"#).unwrap();
    let config = ContactConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.keep_states, 7);

    let mut contacts = town(config);
    let sunday = contacts.query_transmit(AgentId(9), 0).unwrap();
    assert_eq!(sunday.get(&AgentId(10)), Some(&2));
    assert_eq!(total(&sunday), 6);
}

#[test]
fn orchestrators_share_a_sampler() {
    let poisson = Arc::new(PoissonSampler::default());
    let first =
        ContactOrchestrator::with_poisson(ContactConfig::default(), Arc::clone(&poisson)).unwrap();
    let second =
        ContactOrchestrator::with_poisson(ContactConfig::default(), Arc::clone(&poisson)).unwrap();
    assert!(Arc::ptr_eq(first.poisson(), second.poisson()));
    assert_eq!(Arc::strong_count(&poisson), 3);
}
