//! Per-tick movement of free agents.
//!
//! Only wandering and finding agents move. An agent within the arrival
//! epsilon of its target is assigned a fresh random target instead of
//! moving that tick; a finding agent that arrives gives up its search and
//! goes back to wandering. Otherwise the agent steps straight toward its
//! target by at most the configured speed, never overshooting.

use agora_types::{AgentState, Position};
use tracing::debug;

use crate::context::{SimulationContext, random_position};

/// Advance every free agent by one tick.
pub fn step_agents(ctx: &mut SimulationContext) {
    let world = &ctx.config.world;
    let (width, height) = (world.width, world.height);
    let (speed, epsilon) = (world.agent_speed, world.arrival_epsilon);

    for agent in ctx.agents.iter_mut().filter(|a| a.state.is_free()) {
        let distance = agent.position.distance_to(agent.target);
        if distance < epsilon || distance <= f64::EPSILON {
            let target = random_position(&mut ctx.rng, width, height);
            if agent.state == AgentState::Finding {
                debug!(
                    agent = %agent.name,
                    looking_for = agent.motivation.target_name.as_deref().unwrap_or_default(),
                    "search ended, wandering"
                );
            }
            agent.wander(target);
            continue;
        }
        agent.position = step_toward(agent.position, agent.target, distance, speed);
    }
}

/// Move from `from` toward `to` by `speed`, landing on `to` if closer.
fn step_toward(from: Position, to: Position, distance: f64, speed: f64) -> Position {
    if distance <= speed {
        return to;
    }
    let scale = speed / distance;
    Position::new(
        (to.x - from.x).mul_add(scale, from.x),
        (to.y - from.y).mul_add(scale, from.y),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use agora_types::ConversationId;
    use chrono::Utc;

    use super::*;
    use crate::config::SimulationConfig;

    fn context() -> SimulationContext {
        SimulationContext::new(SimulationConfig::default(), Utc::now()).unwrap()
    }

    fn close(a: Position, b: Position) -> bool {
        a.distance_to(b) < 1e-9
    }

    #[test]
    fn step_moves_by_speed_toward_target() {
        let next = step_toward(Position::new(0.0, 0.0), Position::new(30.0, 40.0), 50.0, 2.0);
        assert!(close(next, Position::new(1.2, 1.6)));
    }

    #[test]
    fn step_never_overshoots() {
        let next = step_toward(Position::new(0.0, 0.0), Position::new(1.0, 0.0), 1.0, 2.0);
        assert!(close(next, Position::new(1.0, 0.0)));
    }

    #[test]
    fn only_free_agents_move() {
        let mut ctx = context();
        let id = ConversationId::new();
        let (talker_before, walker_before) = {
            let talker = ctx.agents.get_mut(0).unwrap();
            talker.begin_talking(id);
            talker.target = Position::new(0.0, 0.0);
            let talker_pos = talker.position;
            let walker = ctx.agents.get_mut(1).unwrap();
            walker.position = Position::new(100.0, 100.0);
            walker.target = Position::new(200.0, 100.0);
            (talker_pos, walker.position)
        };

        step_agents(&mut ctx);

        assert!(close(ctx.agents.first().unwrap().position, talker_before));
        let walker = ctx.agents.get(1).unwrap();
        assert!(close(walker.position, Position::new(walker_before.x + 2.0, 100.0)));
    }

    #[test]
    fn arrival_picks_new_target_without_moving() {
        let mut ctx = context();
        let finder = ctx.agents.get_mut(0).unwrap();
        finder.position = Position::new(50.0, 50.0);
        finder.find(String::from("Tomas"), Position::new(52.0, 50.0));

        step_agents(&mut ctx);

        let finder = ctx.agents.first().unwrap();
        assert_eq!(finder.state, AgentState::Wandering);
        assert!(finder.motivation.target_name.is_none());
        assert!(close(finder.position, Position::new(50.0, 50.0)));
        assert!(ctx.invariant_violations().is_empty());
    }
}
